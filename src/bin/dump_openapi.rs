use std::fs;

use clap::Parser;

#[derive(Parser)]
#[command(name = "dump-openapi", about = "Write the OpenAPI document to a file")]
struct Args {
    #[arg(long, default_value = "openapi.json")]
    out: std::path::PathBuf,
    #[arg(long, default_value_t = 8000)]
    port: u16,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let doc = memberhub::docs::build_openapi(args.port)?;
    fs::write(&args.out, serde_json::to_string_pretty(&doc)?)?;
    println!("wrote {}", args.out.display());
    Ok(())
}

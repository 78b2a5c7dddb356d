pub mod member;
pub mod participation;
pub mod project;
pub mod rbac;

pub mod access;
pub mod auth;
pub mod health;
pub mod members;
pub mod participants;
pub mod projects;

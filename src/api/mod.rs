// HTTP surface for the messaging/command collaborator
pub mod handler;
pub mod models;

pub mod artifact;
pub mod chat;
pub mod errors;
pub mod events;
pub mod history;
pub mod prompt;
pub mod settings;
pub mod wire;

pub mod websocket_models;

pub use websocket_models::{AllStatusesPush, OutcomeDto, WsMessage};

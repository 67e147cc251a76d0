//! Peer transport: the inbound node link and the outbound token-service link (§4.8).

pub mod node;
pub mod token_service;

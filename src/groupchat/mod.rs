// src/groupchat/mod.rs

pub mod agent;
pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod event;
pub mod orchestration;
pub mod participant;
pub mod selector;
pub mod termination;
pub mod tool_protocol;
pub mod tool_protocols;
pub mod transcript;


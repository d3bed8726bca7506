#![allow(dead_code)]

pub mod mock_server;
pub mod stub_transport;

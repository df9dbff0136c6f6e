//! Infrastructure layer: adapters behind the domain traits.

pub mod credential;
pub mod dto;
pub mod gateway;
pub mod repository;

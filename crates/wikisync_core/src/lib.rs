pub mod action;
pub mod config;
pub mod dataset;
pub mod entity;
pub mod error;
pub mod markup;
pub mod rest;
pub mod sync;
pub mod transport;
pub mod validate;

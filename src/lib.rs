#![allow(
    clippy::float_cmp,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss
)]

pub mod adapters;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod health;
pub mod indicators;
pub mod llm;
pub mod pipeline;
pub mod ports;
pub mod pricing;
pub mod rate_limiter;
pub mod recommender;
pub mod repository;
pub mod scoring;
pub mod services;

//! Trade compliance decision pipeline: HS code classification, USMCA
//! qualification, tariff savings, and professional referral routing.

pub mod cache_key;
pub mod catalog;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod qualification;
pub mod referral;
pub mod scoring;
pub mod search;
pub mod tariff;
pub mod terms;

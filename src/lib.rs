//! DeepDetect client
//!
//! This library provides the client side of the DeepDetect deepfake analysis
//! service: uploading media for analysis, tracking job status over the
//! per-user push channel, and reconciling those events with the job views a
//! user is looking at.

pub mod app_state;
pub mod config;
pub mod models;
pub mod services;
pub mod views;

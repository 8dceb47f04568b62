//! Cross-module scene scenarios

mod scene_integration;

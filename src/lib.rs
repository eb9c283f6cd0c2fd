//! B2 First Reading Part 5 task generator: prompts a local Ollama model for a
//! title, a text and comprehension questions, recovers and validates the JSON,
//! stores tasks and batches on disk and records QA review annotations.

pub mod telemetry;
pub mod util;
pub mod domain;
pub mod error;
pub mod config;
pub mod seeds;
pub mod llm;
pub mod json_repair;
pub mod validator;
pub mod generator;
pub mod storage;
pub mod batch;
pub mod annotations;
pub mod state;
pub mod protocol;
pub mod logic;
pub mod routes;

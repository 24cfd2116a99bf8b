pub mod engine;
pub mod fields;
pub mod lifecycle;
pub mod merge;
pub mod preview;
pub mod recommend;
pub mod remote;
pub mod rules;
pub mod samples;
pub mod services;

// Integration tests - Whole-engine scenarios on an in-memory chain
mod common;

//! Story document core — parsing and execution for branching
//! interactive narratives.
//!
//! Parses `.sdc` story documents into an immutable [`schema::story::StoryGraph`]
//! and steps through node timelines with a borrowing
//! [`core::cursor::ExecutionCursor`], yielding self-contained result
//! records the host acts on. The core describes side effects; it never
//! applies them.

pub mod core;
pub mod schema;

// Memory event attribution onto the operator call tree
//
// Walks each thread's memory records once, descending and ascending the call
// tree in lockstep with record timestamps. Every record either lands on the
// innermost enclosing operator node or is staled.
//
// Both timelines are already sorted, so the child cursor and the node stack
// only ever move forward: one amortized linear pass per thread.

mod engine;
mod state;

pub use engine::{attribute, attribute_thread, group_by_thread, Attribution, ThreadAttribution};

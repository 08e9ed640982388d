#![allow(clippy::missing_docs_in_private_items)]

mod evaluator;
mod schemas;
mod talk_points;

pub use evaluator::Evaluator;
pub use talk_points::{TalkPointRequest, TalkPointSynthesizer};

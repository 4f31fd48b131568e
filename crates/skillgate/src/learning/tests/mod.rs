mod common;
mod gating;

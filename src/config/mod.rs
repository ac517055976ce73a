pub mod roster;
pub mod rules;
pub mod simulation;

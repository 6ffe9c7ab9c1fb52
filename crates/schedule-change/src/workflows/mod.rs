pub mod roster;
pub mod schedule_change;

// Test module organization
pub mod test_call;
pub mod test_gc;
pub mod test_globals;
pub mod test_stdlib;
pub mod test_userdata;

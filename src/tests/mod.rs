mod dnssec;
mod message;
mod nsec3;
mod query;
pub mod test_harness;
mod wire;

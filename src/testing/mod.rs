mod fake_core;

pub use fake_core::FakeCore;

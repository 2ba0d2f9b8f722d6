pub mod fake_sync;

mod cleanup_tests;
mod mocks;

//! Cache module for Redis-backed session storage
//!
//! This module provides the Redis client with startup retry logic and the
//! Redis implementation of the OTP session store.

pub mod otp_session_store;
pub mod redis_client;


pub use otp_session_store::RedisOtpSessionStore;
pub use redis_client::RedisClient;

// Re-export commonly used types
pub use kl_shared::config::CacheConfig;

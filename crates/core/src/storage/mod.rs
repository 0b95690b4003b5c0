pub mod stale_cache;

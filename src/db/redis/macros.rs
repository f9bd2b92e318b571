/// Read-through caching over an optional Redis cache.
///
/// When `$cache` is `Some`, a hit is returned directly and a miss runs `$block`
/// and queues the result for writing. A failing cache read is logged and
/// treated as a miss. When `$cache` is `None`, `$block` runs every time.
///
/// # Example
/// ```rust,ignore
/// let popular: Vec<Property> = cached!(state.cache, CacheKey::PopularProperties(n), ttl, async {
///     store.popular_properties(n).await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let key = $key;
        match $cache.as_ref() {
            Some(cache) => {
                let hit = match cache.get_from_cache(&key).await {
                    Ok(hit) => hit,
                    Err(e) => {
                        tracing::warn!(error = %e, key = %key, "Cache read failed");
                        None
                    }
                };
                match hit {
                    Some(cached) => Ok(cached),
                    None => match $block.await {
                        Ok(value) => {
                            cache.set_in_background(&key, &value, $ttl);
                            Ok(value)
                        }
                        Err(e) => Err(e),
                    },
                }
            }
            None => $block.await,
        }
    }};
}

//! The per-(domain, pool) routing mutex (SPEC_FULL.md §4.6.1): a polling
//! `SET NX EX` acquisition loop, since the in-process `KVStore` trait has
//! no blocking primitive of its own.

use std::time::Duration;

use relaymesh_kvstore::KVStore;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Attempt to acquire `key` for `ttl`, polling every 100ms until
/// `waiting` elapses. Returns `true` once acquired.
pub async fn acquire(kv: &dyn KVStore, key: &str, ttl: Duration, waiting: Duration) -> relaymesh_kvstore::Result<bool> {
    let deadline = tokio::time::Instant::now() + waiting;
    loop {
        if kv.set_nx_ex(key, "1", ttl).await? {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

pub async fn release(kv: &dyn KVStore, key: &str) -> relaymesh_kvstore::Result<()> {
    kv.del(key).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymesh_kvstore::InMemoryKvStore;

    #[tokio::test]
    async fn acquire_succeeds_when_key_is_free() {
        let kv = InMemoryKvStore::new();
        assert!(acquire(&kv, "lock:routing:example.com:default", Duration::from_secs(5), Duration::from_secs(1))
            .await
            .unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_times_out_when_contended() {
        let kv = InMemoryKvStore::new();
        kv.set_nx_ex("lock", "1", Duration::from_secs(60)).await.unwrap();

        // Paused time auto-advances past the poll sleeps since nothing
        // else in this test can make progress in the meantime.
        let acquired = acquire(&kv, "lock", Duration::from_secs(5), Duration::from_millis(250)).await.unwrap();
        assert!(!acquired);
    }

    #[tokio::test]
    async fn release_frees_the_key_for_a_new_acquisition() {
        let kv = InMemoryKvStore::new();
        assert!(acquire(&kv, "lock", Duration::from_secs(5), Duration::from_secs(1)).await.unwrap());
        release(&kv, "lock").await.unwrap();
        assert!(acquire(&kv, "lock", Duration::from_secs(5), Duration::from_secs(1)).await.unwrap());
    }
}

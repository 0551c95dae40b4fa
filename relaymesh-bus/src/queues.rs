//! Well-known queue names (§6.1's `*_QUEUE`/`*_PREFIX` constants).

/// The routing queue; every inbound envelope lands here first.
#[must_use]
pub fn routing_queue() -> String {
    relaymesh_common::defaults::routing_queue().to_owned()
}

/// Envelopes waiting for any worker to become available.
#[must_use]
pub fn queued_mail_queue() -> String {
    relaymesh_common::defaults::queued_mail_queue().to_owned()
}

/// First-attempt delivery queue for a given worker IP.
#[must_use]
pub fn worker_first_queue(ip: &str) -> String {
    format!("{}:{}", relaymesh_common::defaults::mx_worker_queue_prefix(), ip)
}

/// Retry delivery queue for a given worker IP.
#[must_use]
pub fn worker_retry_queue(ip: &str) -> String {
    format!(
        "{}:{}",
        relaymesh_common::defaults::mx_worker_queue_retry_prefix(),
        ip
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_queue_names_embed_ip() {
        assert_eq!(worker_first_queue("10.0.0.1"), "mailsend.mail.send.first:10.0.0.1");
        assert_eq!(worker_retry_queue("10.0.0.1"), "mailsend.mail.send.retry:10.0.0.1");
    }
}

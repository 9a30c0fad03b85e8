use tgw_storage::{CommandQueue, InMemoryCommandQueue};

#[tokio::test]
async fn fifo_order_is_preserved() {
    let queue = InMemoryCommandQueue::new();
    let first = queue.enqueue("3332210", "A").await.expect("enqueue");
    let second = queue.enqueue("3332210", "B").await.expect("enqueue");
    let third = queue.enqueue("3332210", "C").await.expect("enqueue");

    assert_eq!(queue.queue_len("3332210"), 3);
    assert_eq!(queue.pop("3332210").await.expect("pop"), Some(first));
    assert_eq!(queue.pop("3332210").await.expect("pop"), Some(second));
    assert_eq!(queue.pop("3332210").await.expect("pop"), Some(third));
    assert_eq!(queue.pop("3332210").await.expect("pop"), None);
}

#[tokio::test]
async fn ack_deletes_durable_row_only() {
    let queue = InMemoryCommandQueue::new();
    let entry = queue.enqueue("3332210", "RESET#").await.expect("enqueue");

    // 出队不等于送达：权威行仍在
    let popped = queue.pop("3332210").await.expect("pop").expect("entry");
    assert!(queue.sql_row_exists(popped.id));

    queue.ack(popped.id).await.expect("ack");
    assert!(!queue.sql_row_exists(entry.id));
}

#[tokio::test]
async fn failed_write_requeues_at_head() {
    let queue = InMemoryCommandQueue::new();
    let first = queue.enqueue("3332210", "A").await.expect("enqueue");
    let _second = queue.enqueue("3332210", "B").await.expect("enqueue");

    let popped = queue.pop("3332210").await.expect("pop").expect("entry");
    assert_eq!(popped, first);
    // socket 写失败：放回队头，顺序不变
    queue.push_front("3332210", &popped).await.expect("requeue");
    assert_eq!(queue.pop("3332210").await.expect("pop"), Some(first));
}

#[tokio::test]
async fn queues_are_isolated_per_imei() {
    let queue = InMemoryCommandQueue::new();
    queue.enqueue("111", "A").await.expect("enqueue");
    queue.enqueue("222", "B").await.expect("enqueue");

    let entry = queue.pop("111").await.expect("pop").expect("entry");
    assert_eq!(entry.command, "A");
    assert_eq!(queue.queue_len("222"), 1);
}

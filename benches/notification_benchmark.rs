use chrono::{Duration, Utc};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use training_academy::config::NotificationOrder;
use training_academy::models::{Conversation, Notification, UserRecord};
use training_academy::services::notifications::merge_admin_notifications;

fn fixtures(pending: usize, conversations: usize) -> (Vec<Notification>, Vec<Notification>) {
    let now = Utc::now();

    let pending = (0..pending)
        .map(|i| {
            let user = UserRecord::new_pending(
                &format!("pending-{}", i),
                "Pending User",
                "pending@example.com",
                now - Duration::minutes(i as i64 * 7),
            );
            Notification::access_request(&user)
        })
        .collect();

    let messages = (0..conversations)
        .map(|i| {
            let conversation = Conversation {
                id: format!("trainee-{}", i),
                user_name: "Trainee".to_string(),
                user_email: "trainee@example.com".to_string(),
                last_message: Some("I can't open the quiz".to_string()),
                updated_at: Some(now - Duration::minutes(i as i64 * 5)),
                created_at: Some(now - Duration::days(1)),
            };
            Notification::support_message(&conversation)
        })
        .collect();

    (pending, messages)
}

fn benchmark_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("admin_notification_merge");

    // Typical dashboard: a handful of requests plus the five recent threads
    let (pending, messages) = fixtures(12, 5);
    group.bench_function("positional_typical", |b| {
        b.iter(|| {
            merge_admin_notifications(
                black_box(&pending),
                black_box(&messages),
                NotificationOrder::Positional,
            )
        })
    });
    group.bench_function("chronological_typical", |b| {
        b.iter(|| {
            merge_admin_notifications(
                black_box(&pending),
                black_box(&messages),
                NotificationOrder::Chronological,
            )
        })
    });

    // Backlog after a large onboarding wave
    let (pending, messages) = fixtures(2_000, 5);
    group.bench_function("chronological_backlog", |b| {
        b.iter(|| {
            merge_admin_notifications(
                black_box(&pending),
                black_box(&messages),
                NotificationOrder::Chronological,
            )
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_merge);
criterion_main!(benches);

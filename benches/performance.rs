use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use firmdesk::db::models::{NewTask, PrivacySettings, Role, TaskFilter, Viewer};
use firmdesk::db::{create_pool, run_migrations};
use firmdesk::directory::Directory;
use firmdesk::privacy::{filter_rows, Facet, PrivacyFilter};
use firmdesk::tasks::TaskManager;
use sqlx::types::Json;
use std::collections::HashMap;
use std::hint::black_box;
use tempfile::TempDir;
use tokio::runtime::Runtime;

struct Firm {
    _temp_dir: TempDir,
    pool: sqlx::SqlitePool,
    staff: Vec<Viewer>,
}

/// A firm with `users` staff members and `tasks` tasks spread across them,
/// every fourth task left in the pool.
async fn setup_firm(users: usize, tasks: usize) -> Firm {
    let temp_dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", temp_dir.path().join("bench.db").display());
    let pool = create_pool(&url, 5).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let directory = Directory::new(&pool);
    let org = directory.create_org("Bench & Co").await.unwrap().id;
    let mut staff = Vec::with_capacity(users);
    for i in 0..users {
        let user = directory
            .create_user(org, &format!("Staff {}", i), &format!("staff{}@bench.test", i), Role::Staff)
            .await
            .unwrap();
        staff.push(Viewer::from(&user));
    }

    let task_mgr = TaskManager::new(&pool);
    for i in 0..tasks {
        let creator = &staff[i % users];
        let assigned_to = if i % 4 == 0 { None } else { Some(creator.user_id) };
        task_mgr
            .add_task(
                creator,
                NewTask {
                    title: format!("Engagement {}", i),
                    assigned_to,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    Firm {
        _temp_dir: temp_dir,
        pool,
        staff,
    }
}

fn bench_filter_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_rows");

    for size in [100usize, 1_000, 10_000].iter() {
        let viewer = Viewer {
            user_id: 0,
            org_id: 1,
            role: Role::Staff,
        };
        let rows: Vec<(usize, Option<i64>)> =
            (0..*size).map(|i| (i, Some((i % 50) as i64 + 1))).collect();
        let settings: HashMap<i64, PrivacySettings> = (1..=50)
            .map(|uid| {
                let mut s = PrivacySettings::visible_defaults(uid);
                s.hide_tasks_from_peers = uid % 2 == 0;
                s.visible_to_user_ids = Json(vec![0]);
                (uid, s)
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                black_box(filter_rows(
                    rows.clone(),
                    &viewer,
                    &settings,
                    Facet::Tasks,
                    |r: &(usize, Option<i64>)| r.1,
                ))
            });
        });
    }

    group.finish();
}

fn bench_find_tasks_with_privacy(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("find_tasks_with_privacy");

    for size in [100usize, 1_000].iter() {
        let firm = rt.block_on(setup_firm(20, *size));
        let viewer = firm.staff[0];
        let filter = TaskFilter::default();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.to_async(&rt).iter(|| async {
                let tasks = TaskManager::new(&firm.pool)
                    .find_tasks(viewer.org_id, &filter)
                    .await
                    .unwrap();
                black_box(
                    PrivacyFilter::new(&firm.pool)
                        .filter_tasks_by_privacy(tasks, &viewer)
                        .await
                        .unwrap(),
                );
            });
        });
    }

    group.finish();
}

fn bench_list_unassigned(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let firm = rt.block_on(setup_firm(20, 1_000));
    let org_id = firm.staff[0].org_id;

    c.bench_function("list_unassigned", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(
                TaskManager::new(&firm.pool)
                    .list_unassigned(org_id)
                    .await
                    .unwrap(),
            );
        });
    });
}

criterion_group!(
    benches,
    bench_filter_rows,
    bench_find_tasks_with_privacy,
    bench_list_unassigned
);
criterion_main!(benches);

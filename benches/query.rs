//! Query Validation Performance Benchmarks
//!
//! Every query pays for a parse, a tree walk and (usually) a re-render before it
//! reaches the database. These benchmarks measure:
//! - Read-only validation of simple and CTE-heavy queries
//! - Row bounding with and without an existing LIMIT
//! - The textual fallback for input the parser rejects

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sqlgate::validator::bound_textually;
use sqlgate::{bound_query, validate_read_only, SqlDialect};

const SIMPLE: &str = "SELECT id, total FROM orders WHERE total > 10 ORDER BY id";

const ANALYTICAL: &str = "WITH monthly AS (
        SELECT date_trunc('month', created_at) AS month, customer_id, SUM(total) AS spent
        FROM orders
        WHERE status IN ('paid', 'shipped')
        GROUP BY 1, 2
    ),
    ranked AS (
        SELECT month, customer_id, spent,
               RANK() OVER (PARTITION BY month ORDER BY spent DESC) AS position
        FROM monthly
    )
    SELECT r.month, c.name, r.spent
    FROM ranked r
    JOIN customers c ON c.id = r.customer_id
    WHERE r.position <= 10
    ORDER BY r.month, r.position";

fn bench_validate(c: &mut Criterion) {
    c.bench_function("validate_simple_select", |b| {
        b.iter(|| validate_read_only(black_box(SIMPLE), SqlDialect::Postgres));
    });

    c.bench_function("validate_cte_window_join", |b| {
        b.iter(|| validate_read_only(black_box(ANALYTICAL), SqlDialect::Postgres));
    });

    c.bench_function("validate_rejects_delete", |b| {
        b.iter(|| validate_read_only(black_box("DELETE FROM orders WHERE id = 1"), SqlDialect::Postgres));
    });
}

fn bench_bound(c: &mut Criterion) {
    c.bench_function("bound_inject_limit", |b| {
        b.iter(|| bound_query(black_box(SIMPLE), SqlDialect::Postgres, 1000));
    });

    c.bench_function("bound_existing_limit", |b| {
        b.iter(|| bound_query(black_box("SELECT id FROM orders LIMIT 5"), SqlDialect::MySql, 1000));
    });

    c.bench_function("bound_cte_window_join", |b| {
        b.iter(|| bound_query(black_box(ANALYTICAL), SqlDialect::Postgres, 1000));
    });

    c.bench_function("bound_textual_fallback", |b| {
        b.iter(|| bound_textually(black_box("SELECT id FROM orders WHERE $$odd$$;"), 1000));
    });
}

criterion_group!(benches, bench_validate, bench_bound);
criterion_main!(benches);

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_postgres::{Config, NoTls, SimpleQueryMessage};
use ulid::Ulid;

/// Twelve half-hour slots every weekday, 08:00 to 14:00.
const SCHEDULE: &str = r#"{"mon": ["08:00 - 08:30", "08:30 - 09:00", "09:00 - 09:30", "09:30 - 10:00", "10:00 - 10:30", "10:30 - 11:00", "11:00 - 11:30", "11:30 - 12:00", "12:00 - 12:30", "12:30 - 13:00", "13:00 - 13:30", "13:30 - 14:00"],
 "tue": ["08:00 - 08:30", "08:30 - 09:00", "09:00 - 09:30", "09:30 - 10:00"],
 "wed": ["08:00 - 08:30", "08:30 - 09:00", "09:00 - 09:30", "09:30 - 10:00"],
 "thu": ["08:00 - 08:30", "08:30 - 09:00", "09:00 - 09:30", "09:30 - 10:00"],
 "fri": ["08:00 - 08:30", "08:30 - 09:00", "09:00 - 09:30", "09:30 - 10:00"]}"#;

async fn connect(host: &str, port: u16) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(host)
        .port(port)
        .dbname("bench")
        .user("slotwise")
        .password(std::env::var("SLOTWISE_PASSWORD").unwrap_or_else(|_| "slotwise".into()));

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

fn first_id(messages: &[SimpleQueryMessage]) -> String {
    messages
        .iter()
        .find_map(|m| match m {
            SimpleQueryMessage::Row(row) => row.get("id").map(str::to_string),
            _ => None,
        })
        .expect("no id row")
}

/// Register a throwaway provider with one service and return the service id.
async fn setup_service(client: &tokio_postgres::Client, capacity: u32) -> String {
    let name = format!("bench-{}", Ulid::new());
    let rows = client
        .simple_query(&format!("INSERT INTO providers (name) VALUES ('{name}')"))
        .await
        .unwrap();
    let provider_id = first_id(&rows);

    let rows = client
        .simple_query(&format!(
            "INSERT INTO services (provider_id, name, capacity, first_name, last_name, role, description, schedule) \
             VALUES ('{provider_id}', 'Bench', {capacity}, 'Bea', 'Ench', 'Staff', '', '{SCHEDULE}')"
        ))
        .await
        .unwrap();
    first_id(&rows)
}

fn booking_sql(service_id: &str, day: &str, slot: &str, customer: &str) -> String {
    format!(
        "INSERT INTO bookings (service_id, day, slot, customer_name) VALUES ('{service_id}', '{day}', '{slot}', '{customer}')"
    )
}

async fn phase1_sequential(host: &str, port: u16) {
    let client = connect(host, port).await;
    let service_id = setup_service(&client, 10_000).await;

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        client
            .batch_execute(&booking_sql(&service_id, "mon", "09:00 - 09:30", &format!("c{i}")))
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("admission latency", &mut latencies);
}

/// Many clients race for the same few seats. Exactly `capacity` must win.
async fn phase2_contended(host: &str, port: u16) {
    let capacity = 5;
    let n_tasks = 50;

    let setup = connect(host, port).await;
    let service_id = setup_service(&setup, capacity).await;

    let admitted = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let mut handles = Vec::new();

    for i in 0..n_tasks {
        let host = host.to_string();
        let service_id = service_id.clone();
        let admitted = admitted.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let sql = booking_sql(&service_id, "tue", "08:00 - 08:30", &format!("racer{i}"));
            if client.batch_execute(&sql).await.is_ok() {
                admitted.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let won = admitted.load(Ordering::Relaxed);
    println!(
        "  {n_tasks} racers for {capacity} seats: {won} admitted in {:.2}s{}",
        start.elapsed().as_secs_f64(),
        if won == capacity as usize { "" } else { "  <-- OVERSOLD OR UNDERSOLD" }
    );
}

async fn phase3_concurrent(host: &str, port: u16) {
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();

    for t in 0..n_tasks {
        let host = host.to_string();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let service_id = setup_service(&client, 10_000).await;
            for j in 0..n_per_task {
                client
                    .batch_execute(&booking_sql(&service_id, "mon", "10:00 - 10:30", &format!("t{t}c{j}")))
                    .await
                    .unwrap();
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase4_read_under_load(host: &str, port: u16) {
    let setup = connect(host, port).await;
    let service_id = setup_service(&setup, 10_000).await;
    drop(setup);

    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5 {
        let host = host.to_string();
        let stop = stop.clone();
        let service_id = service_id.clone();
        writer_handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let mut i = 0u64;
            while !stop.load(Ordering::Relaxed) {
                let _ = client
                    .batch_execute(&booking_sql(&service_id, "mon", "11:00 - 11:30", &format!("w{w}c{i}")))
                    .await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for r in 0..n_readers {
        let host = host.to_string();
        let service_id = service_id.clone();
        reader_handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let sql = if (r + i) % 2 == 0 {
                    format!("SELECT * FROM slots WHERE service_id = '{service_id}' AND day = 'mon'")
                } else {
                    format!(
                        "SELECT * FROM availability WHERE service_id = '{service_id}' AND day = 'mon' AND slot = '11:00 - 11:30'"
                    )
                };
                let t = Instant::now();
                client.simple_query(&sql).await.unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("slot listing / availability", &mut all_latencies);
}

async fn phase5_connection_storm(host: &str, port: u16) {
    let n_conns = 50;
    let ops_per_conn = 10;

    let start = Instant::now();
    let mut handles = Vec::new();
    let success = Arc::new(AtomicUsize::new(0));

    for c in 0..n_conns {
        let host = host.to_string();
        let success = success.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let service_id = setup_service(&client, 100).await;
            for i in 0..ops_per_conn {
                client
                    .batch_execute(&booking_sql(&service_id, "wed", "09:00 - 09:30", &format!("s{c}c{i}")))
                    .await
                    .unwrap();
            }
            success.fetch_add(1, Ordering::Relaxed);
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let ok = success.load(Ordering::Relaxed);
    println!(
        "  {n_conns} connections, {ops_per_conn} ops each: {ok}/{n_conns} succeeded in {:.2}s",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let host = std::env::var("SLOTWISE_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("SLOTWISE_PORT")
        .unwrap_or_else(|_| "5433".into())
        .parse()
        .expect("invalid SLOTWISE_PORT");

    println!("=== slotwise stress benchmark ===");
    println!("target: {host}:{port}\n");

    // Each phase registers its own providers so phases never share seats.

    println!("[phase 1] sequential admission throughput");
    phase1_sequential(&host, port).await;

    println!("\n[phase 2] contended slot");
    phase2_contended(&host, port).await;

    println!("\n[phase 3] concurrent admission throughput");
    phase3_concurrent(&host, port).await;

    println!("\n[phase 4] read latency under write load");
    phase4_read_under_load(&host, port).await;

    println!("\n[phase 5] connection storm");
    phase5_connection_storm(&host, port).await;

    println!("\n=== benchmark complete ===");
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate, NaiveTime, TimeDelta};
use ulid::Ulid;

use slotwise::model::*;
use slotwise::ports::{AppointmentRepository, FixedClock};
use slotwise::{
    BookingOutcome, BookingRequest, Collaborators, Engine, InMemoryStore, SchedulingConfig, SchedulingMode,
};

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
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

fn first_day() -> NaiveDate {
    // A Monday.
    NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
}

struct Salon {
    store: Arc<InMemoryStore>,
    engine: Arc<Engine>,
    staff: Vec<Ulid>,
    customer: Ulid,
    service: Ulid,
}

async fn setup(n_staff: usize, config: SchedulingConfig) -> Salon {
    let store = Arc::new(InMemoryStore::new());
    let open = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
    let close = NaiveTime::from_hms_opt(20, 0, 0).unwrap();
    for weekday in 0..7u8 {
        store
            .set_business_day(BusinessDay { weekday, enabled: weekday != 0, start: open, end: close })
            .await
            .unwrap();
    }

    let mut staff = Vec::with_capacity(n_staff);
    for _ in 0..n_staff {
        let id = Ulid::new();
        store
            .upsert_staff(Staff { id, name: None, working_hours: WeeklyHours::default(), active: true })
            .await
            .unwrap();
        staff.push(id);
    }
    let customer = Ulid::new();
    store.upsert_customer(Customer { id: customer, name: None }).await.unwrap();
    let service = Ulid::new();
    store
        .upsert_service(Service { id: service, name: None, duration_minutes: Some(45), price: 0 })
        .await
        .unwrap();

    let clock = Arc::new(FixedClock::new(first_day().and_time(NaiveTime::MIN)));
    let collaborators = Collaborators::from_store(store.clone()).with_hours_cache(clock.clone(), config.hours_cache_ttl());
    let engine = Arc::new(Engine::new(collaborators, clock, config));
    println!("  created {n_staff} staff members");
    Salon { store, engine, staff, customer, service }
}

async fn phase1_sequential(salon: &Salon) {
    let staff = salon.staff[0];
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let mut from = first_day().and_time(NaiveTime::from_hms_opt(8, 0, 0).unwrap());
    let start = Instant::now();

    for _ in 0..n {
        let req = BookingRequest::new(staff, salon.customer, salon.service, from).with_mode(SchedulingMode::AutoBook);
        let t = Instant::now();
        let outcome = salon.engine.book(req).await.unwrap();
        latencies.push(t.elapsed());
        if let BookingOutcome::Booked(a) = outcome {
            from = a.span.end;
        }
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("book latency", &mut latencies);
}

async fn phase2_concurrent(salon: &Salon) {
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();

    for i in 0..n_tasks {
        let engine = salon.engine.clone();
        // Two tasks per staff member, so half the writes contend.
        let staff = salon.staff[1 + i / 2];
        let customer = salon.customer;
        let service = salon.service;
        handles.push(tokio::spawn(async move {
            let mut conflicts = 0usize;
            let base = first_day().and_time(NaiveTime::from_hms_opt(8, 0, 0).unwrap());
            for j in 0..n_per_task {
                let start = base + TimeDelta::minutes(45 * j as i64);
                let req = BookingRequest::new(staff, customer, service, start).with_mode(SchedulingMode::AutoBook);
                if engine.book(req).await.is_err() {
                    conflicts += 1;
                }
            }
            conflicts
        }));
    }

    let mut conflicts = 0;
    for h in handles {
        conflicts += h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec ({conflicts} lost races)",
        elapsed.as_secs_f64()
    );
}

async fn phase3_search_under_load(salon: &Salon) {
    let staff = *salon.staff.last().unwrap();
    // Dense calendar: four weeks booked solid except the last 45 minutes
    // of the final Saturday.
    let mut day = first_day();
    for offset in 0..27 {
        if weekday_of(day) != 0 {
            let end = if offset == 26 { (19, 15) } else { (20, 0) };
            let span = Span::new(
                day.and_time(NaiveTime::from_hms_opt(8, 0, 0).unwrap()),
                day.and_time(NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap()),
            );
            salon
                .store
                .create(NewAppointment {
                    staff_id: staff,
                    customer_id: salon.customer,
                    service_id: salon.service,
                    span,
                    status: AppointmentStatus::Confirmed,
                    notes: None,
                    forced: false,
                    idempotency_key: None,
                })
                .await
                .unwrap();
        }
        day = day.checked_add_days(Days::new(1)).unwrap();
    }

    // Writer tasks keep booking other staff members in the background.
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5 {
        let engine = salon.engine.clone();
        let stop = stop.clone();
        let staff = salon.staff[1 + w];
        let customer = salon.customer;
        let service = salon.service;
        writer_handles.push(tokio::spawn(async move {
            let mut from = first_day().and_time(NaiveTime::MIN) + TimeDelta::days(60);
            while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                let req = BookingRequest::new(staff, customer, service, from).with_mode(SchedulingMode::AutoBook);
                match engine.book(req).await {
                    Ok(BookingOutcome::Booked(a)) => from = a.span.end,
                    _ => from += TimeDelta::days(1),
                }
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 200;
    let mut reader_handles = Vec::new();
    for _ in 0..n_readers {
        let engine = salon.engine.clone();
        reader_handles.push(tokio::spawn(async move {
            let from = first_day().and_time(NaiveTime::from_hms_opt(8, 0, 0).unwrap());
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                let slot = engine.find_next_slot(staff, 45, from).await.unwrap();
                latencies.push(t.elapsed());
                assert!(slot.is_some());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("slot search (dense month)", &mut all_latencies);
}

#[tokio::main]
async fn main() {
    slotwise::observability::init_tracing();
    let metrics_port = std::env::var("SLOTWISE_METRICS_PORT").ok().and_then(|p| p.parse().ok());
    slotwise::observability::init(metrics_port);

    let config = SchedulingConfig {
        search_horizon_days: 31,
        ..SchedulingConfig::from_env()
    };

    println!("=== slotwise stress benchmark ===\n");

    println!("[setup]");
    let salon = setup(12, config).await;

    println!("\n[phase 1] sequential booking throughput");
    phase1_sequential(&salon).await;

    println!("\n[phase 2] concurrent booking throughput");
    phase2_concurrent(&salon).await;

    println!("\n[phase 3] slot search latency under write load");
    phase3_search_under_load(&salon).await;

    println!("\n=== done ===");
}

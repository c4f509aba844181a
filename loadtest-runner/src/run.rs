//! Run simulated users against a relay and collect metrics.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, ensure};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use sketches_ddsketch::DDSketch;
use tokio::time::Instant;
use yansi::Paint;

use crate::config::Config;
use crate::relay::RelayClient;
use crate::users::{UserClass, distribute_users};

/// Latencies and failures of one task.
#[derive(Default)]
pub struct TaskMetrics {
    /// Latencies of successful executions, in seconds.
    pub timing: DDSketch,
    /// Number of failed executions.
    pub failures: u64,
}

impl TaskMetrics {
    /// Number of successful executions.
    pub fn successes(&self) -> usize {
        self.timing.count()
    }

    fn merge(&mut self, other: &TaskMetrics) -> Result<()> {
        self.timing
            .merge(&other.timing)
            .map_err(|e| anyhow!("failed to merge latencies: {e:?}"))?;
        self.failures += other.failures;
        Ok(())
    }
}

impl fmt::Debug for TaskMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskMetrics")
            .field("successes", &self.successes())
            .field("failures", &self.failures)
            .finish()
    }
}

/// The result of a load test run.
#[derive(Debug)]
pub struct Report {
    /// How long users were sending.
    pub duration: Duration,
    /// Number of users started per class.
    pub users: BTreeMap<String, usize>,
    /// Metrics by task name.
    pub tasks: BTreeMap<String, TaskMetrics>,
}

impl Report {
    /// Metrics of all tasks combined.
    pub fn total(&self) -> Result<TaskMetrics> {
        let mut total = TaskMetrics::default();
        for metrics in self.tasks.values() {
            total.merge(metrics)?;
        }
        Ok(total)
    }

    /// Prints the report to stdout.
    pub fn print(&self) -> Result<()> {
        let num_users: usize = self.users.values().sum();
        println!();
        println!(
            "{} ({} users over {:.2?})",
            "## Load test".bold(),
            num_users.bold(),
            self.duration
        );
        for (name, count) in &self.users {
            println!("  {}: {count}", name.blue());
        }

        for (name, metrics) in &self.tasks {
            println!();
            println!("{} {}", "## Task".bold(), name.bold().blue());
            print_metrics(metrics, self.duration);
        }

        println!();
        println!("{}", "## TOTALS".bold());
        print_metrics(&self.total()?, self.duration);
        println!();

        Ok(())
    }
}

/// Runs all configured users against the relay until the configured duration has passed.
pub async fn run(config: Config) -> Result<Report> {
    let client = Arc::new(RelayClient::new(&config.relay.url())?.compress(config.relay.compress));

    let mut classes = Vec::new();
    for (name, user_config) in &config.users {
        let class = UserClass::from_config(
            name,
            user_config,
            config.use_fake_projects,
            &config.projects,
        )?;
        classes.extend(class.map(Arc::new));
    }
    ensure!(!classes.is_empty(), "no enabled user classes");

    let spawn_interval = match config.spawn_rate {
        Some(rate) => {
            ensure!(rate.is_finite() && rate > 0.0, "`spawn_rate` must be positive");
            Some(Duration::from_secs_f64(1.0 / rate))
        }
        None => None,
    };

    let weights: Vec<u32> = classes.iter().map(|class| class.weight()).collect();
    let counts = distribute_users(config.num_users, &weights);

    tracing::info!(
        relay = %config.relay.url(),
        users = config.num_users,
        duration = ?config.duration,
        "starting load test"
    );

    let start = Instant::now();
    let deadline = start + config.duration;
    let mut users = BTreeMap::new();
    let mut handles = Vec::new();

    'spawn: for (class, &count) in classes.iter().zip(&counts) {
        users.insert(class.name().to_owned(), 0);
        for _ in 0..count {
            if let Some(interval) = spawn_interval {
                if !handles.is_empty() {
                    tokio::time::sleep(interval).await;
                }
                if Instant::now() >= deadline {
                    break 'spawn;
                }
            }

            let seed = rand::random();
            let handle = tokio::spawn(run_user(client.clone(), class.clone(), seed, deadline));
            handles.push(handle);
            *users.entry(class.name().to_owned()).or_default() += 1;
        }
    }

    let finished = futures::future::join_all(handles).await;
    let duration = start.elapsed();

    let mut tasks: BTreeMap<String, TaskMetrics> = BTreeMap::new();
    for result in finished {
        let user_metrics = result.context("user task panicked")?;
        for (name, metrics) in user_metrics {
            tasks.entry(name).or_default().merge(&metrics)?;
        }
    }

    tracing::info!("load test finished");
    Ok(Report {
        duration,
        users,
        tasks,
    })
}

/// Executes tasks of a single user until the deadline.
///
/// Requests still in flight at the deadline are abandoned and not counted.
async fn run_user(
    client: Arc<RelayClient>,
    class: Arc<UserClass>,
    seed: u64,
    deadline: Instant,
) -> BTreeMap<String, TaskMetrics> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut metrics: BTreeMap<String, TaskMetrics> = BTreeMap::new();

    // See <https://docs.rs/tokio/latest/tokio/time/struct.Sleep.html#examples>
    let sleep = tokio::time::sleep_until(deadline);
    tokio::pin!(sleep);

    loop {
        let task = class.choose_task(&mut rng);
        let project = class.choose_project(&mut rng).clone();

        let start = Instant::now();
        let result = tokio::select! {
            result = task.execute(&client, &project, &mut rng) => result,
            _ = &mut sleep => break,
        };

        let task_metrics = metrics.entry(task.name().to_owned()).or_default();
        match result {
            Ok(()) => task_metrics.timing.add(start.elapsed().as_secs_f64()),
            Err(error) => {
                tracing::debug!(
                    task = task.name(),
                    project = project.id,
                    error = &error as &dyn std::error::Error,
                    "task failed"
                );
                task_metrics.failures += 1;
            }
        }

        let delay = class.wait_time().delay(&mut rng, start.elapsed());
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut sleep => break,
        }
    }

    metrics
}

fn print_metrics(metrics: &TaskMetrics, duration: Duration) {
    let sketch = &metrics.timing;
    if sketch.count() > 0 {
        print!("{} ({} ops", "SENT:".bold().green(), sketch.count().bold());
        if metrics.failures > 0 {
            print!(
                ", {}",
                format!("{} FAILURES", metrics.failures).bold().red()
            )
        }
        println!(")");
        print_ops(sketch, duration);
        println!();
        print_percentiles(sketch, Duration::from_secs_f64);
    } else if metrics.failures > 0 {
        println!(
            "{}",
            format!("{} FAILURES", metrics.failures).bold().red()
        );
    } else {
        println!("  no requests");
    }
}

fn print_percentiles<T: fmt::Debug>(sketch: &DDSketch, map: impl Fn(f64) -> T) {
    let ops = sketch.count();
    let quantile = |q| sketch.quantile(q).ok().flatten().unwrap_or_default();
    let avg = map(sketch.sum().unwrap_or_default() / ops as f64);
    let p50 = map(quantile(0.5));
    let p90 = map(quantile(0.9));
    let p99 = map(quantile(0.99));
    println!(
        "  avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
        avg.bold()
    );
}

fn print_ops(sketch: &DDSketch, duration: Duration) {
    let ops = sketch.count();
    let ops_ps = ops as f64 / duration.as_secs_f64();
    print!("  {:.2} requests/s", ops_ps.bold());
}

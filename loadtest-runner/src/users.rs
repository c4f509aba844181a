//! Classes of simulated users.

use anyhow::{Context, Result, bail, ensure};
use loadtest_types::project::ProjectInfo;
use rand::Rng;
use rand_distr::Distribution;
use rand_distr::weighted::WeightedIndex;

use crate::config::UserConfig;
use crate::tasks::Task;
use crate::wait::WaitTime;

/// Users sharing the same tasks, projects and pacing.
#[derive(Debug)]
pub struct UserClass {
    name: String,
    weight: u32,
    wait_time: WaitTime,
    projects: Vec<ProjectInfo>,
    tasks: Vec<Task>,
    task_distribution: WeightedIndex<u32>,
}

impl UserClass {
    /// Creates a user class from its configuration.
    ///
    /// Returns `None` if the class is disabled. `projects` lists the configured projects, which
    /// are only used when `use_fake_projects` is off.
    pub fn from_config(
        name: &str,
        config: &UserConfig,
        use_fake_projects: bool,
        projects: &[ProjectInfo],
    ) -> Result<Option<Self>> {
        if config.weight == 0 {
            tracing::info!(user = name, "user class disabled");
            return Ok(None);
        }

        let mut tasks = Vec::new();
        let mut weights = Vec::new();
        for (task_name, task_config) in config.tasks.entries() {
            if task_config.weight == 0 {
                continue;
            }
            let task = Task::new(task_name, &task_config.params)
                .with_context(|| format!("invalid task `{task_name}` of user `{name}`"))?;
            tasks.push(task);
            weights.push(task_config.weight);
        }
        ensure!(!tasks.is_empty(), "user `{name}` has no enabled tasks");

        let projects = select_projects(config.num_projects, use_fake_projects, projects)
            .with_context(|| format!("invalid projects of user `{name}`"))?;

        Ok(Some(Self {
            name: name.to_owned(),
            weight: config.weight,
            wait_time: config.wait_time,
            projects,
            tasks,
            task_distribution: WeightedIndex::new(weights)?,
        }))
    }

    /// The name of the class.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Relative share of this class among all users.
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// The pause between two tasks.
    pub fn wait_time(&self) -> WaitTime {
        self.wait_time
    }

    /// Picks the next task by weight.
    pub fn choose_task<R: Rng + ?Sized>(&self, rng: &mut R) -> &Task {
        &self.tasks[self.task_distribution.sample(rng)]
    }

    /// Picks the project to send the next payload to.
    pub fn choose_project<R: Rng + ?Sized>(&self, rng: &mut R) -> &ProjectInfo {
        // `select_projects` never returns an empty list.
        &self.projects[rng.random_range(0..self.projects.len())]
    }
}

fn select_projects(
    num_projects: usize,
    use_fake_projects: bool,
    projects: &[ProjectInfo],
) -> Result<Vec<ProjectInfo>> {
    ensure!(num_projects > 0, "`num_projects` must be at least 1");

    if use_fake_projects {
        return Ok((1..=num_projects as u64).map(ProjectInfo::fake).collect());
    }

    if projects.is_empty() {
        bail!("`use_fake_projects` is off, but no projects are configured");
    }
    if num_projects > projects.len() {
        tracing::warn!(
            num_projects,
            available = projects.len(),
            "fewer projects configured than requested"
        );
    }
    Ok(projects.iter().take(num_projects).cloned().collect())
}

/// Splits `total` users across classes proportionally to their weights.
///
/// Remainders go to the classes with the largest fractional share, earlier classes first.
pub fn distribute_users(total: usize, weights: &[u32]) -> Vec<usize> {
    let weight_sum: u64 = weights.iter().map(|&w| u64::from(w)).sum();
    if weight_sum == 0 {
        return vec![0; weights.len()];
    }

    let shares: Vec<(usize, u64)> = weights
        .iter()
        .map(|&w| {
            let scaled = total as u64 * u64::from(w);
            ((scaled / weight_sum) as usize, scaled % weight_sum)
        })
        .collect();

    let mut counts: Vec<usize> = shares.iter().map(|&(count, _)| count).collect();
    let mut remaining = total - counts.iter().sum::<usize>();

    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|&a, &b| shares[b].1.cmp(&shares[a].1));
    for index in order {
        if remaining == 0 {
            break;
        }
        counts[index] += 1;
        remaining -= 1;
    }

    counts
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::config::Config;

    fn config(yaml: &str) -> Config {
        Config::from_yaml(yaml).unwrap()
    }

    #[test]
    fn distribution() {
        assert_eq!(distribute_users(10, &[1, 1]), [5, 5]);
        assert_eq!(distribute_users(10, &[3, 1]), [8, 2]);
        assert_eq!(distribute_users(1, &[1, 1, 1]), [1, 0, 0]);
        assert_eq!(distribute_users(5, &[0, 1]), [0, 5]);
        assert_eq!(distribute_users(7, &[0, 0]), [0, 0]);
        assert_eq!(distribute_users(100, &[1, 1, 1]).iter().sum::<usize>(), 100);
    }

    #[test]
    fn class_from_config() {
        let config = config(
            r#"
relay: {host: localhost, port: 3000}
duration: 1s
users:
  errors:
    weight: 2
    num_projects: 3
    tasks:
      random_event:
        weight: 1
      random_session:
        weight: 0
"#,
        );

        let class = UserClass::from_config("errors", &config.users["errors"], true, &[])
            .unwrap()
            .unwrap();
        assert_eq!(class.name(), "errors");
        assert_eq!(class.weight(), 2);

        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..50 {
            assert_eq!(class.choose_task(&mut rng).name(), "random_event");
            assert!((1..=3).contains(&class.choose_project(&mut rng).id));
        }
    }

    #[test]
    fn disabled_and_invalid_classes() {
        let config = config(
            r#"
relay: {host: localhost, port: 3000}
duration: 1s
users:
  disabled:
    weight: 0
    tasks: [random_event]
  no_tasks:
    tasks:
      random_event: {weight: 0}
  unknown:
    tasks: [random_nonsense]
"#,
        );

        let class = |name: &str| UserClass::from_config(name, &config.users[name], true, &[]);
        assert!(class("disabled").unwrap().is_none());
        assert!(class("no_tasks").is_err());
        assert!(class("unknown").is_err());
    }

    #[test]
    fn configured_projects() {
        let projects = [
            ProjectInfo { id: 10, key: "k10".into() },
            ProjectInfo { id: 11, key: "k11".into() },
        ];

        let selected = select_projects(5, false, &projects).unwrap();
        assert_eq!(selected, projects);

        let selected = select_projects(1, false, &projects).unwrap();
        assert_eq!(selected, projects[..1]);

        assert!(select_projects(1, false, &[]).is_err());
        assert!(select_projects(0, true, &[]).is_err());
    }
}

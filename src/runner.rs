//! Runner
//!
//! Wires a dataset, a run configuration and an expressivity source into the audit
//! sweep, once per alpha window.
use crate::audit::{Auditor, FailurePolicy};
use crate::data::Dataset;
use crate::errors::AuditError;
use crate::expressivity::{ExpressivityFactory, ExpressivityProvider, Split};
use crate::report::AuditReport;
use crate::solver::{
    AlphaWindow, GameConfig, GameSolver, GradientConfig, GradientSolver, JsonIO, SplitView, SubgroupSearch,
};
use crate::utils::{items_to_strings, validate_float_parameter};
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Which subgroup search to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Strategy {
    /// Game dynamics against externally supplied expressivity.
    #[default]
    Game,
    /// Descent on the weighted-least-squares surrogate.
    Gradient,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Strategy::Game => write!(f, "game"),
            Strategy::Gradient => write!(f, "gradient"),
        }
    }
}

impl FromStr for Strategy {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "game" => Ok(Strategy::Game),
            "gradient" => Ok(Strategy::Gradient),
            _ => Err(AuditError::ParseString(
                s.to_string(),
                "Strategy".to_string(),
                items_to_strings(vec!["game", "gradient"]),
            )),
        }
    }
}

fn default_test_fraction() -> f64 {
    0.2
}
fn default_windows() -> Vec<[f64; 2]> {
    vec![[0.1, 0.5]]
}

/// Everything one audit run needs besides the data and the expressivity source.
#[derive(Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Name of the target column.
    pub target: String,
    /// Names of the columns the subgroup indicator may use.
    pub sensitive: Vec<String>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    /// Alpha windows `[low, high]`, each audited in turn.
    #[serde(default = "default_windows")]
    pub windows: Vec<[f64; 2]>,
    /// Shuffle the target before splitting, as a null baseline.
    #[serde(default)]
    pub dummy: bool,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub gradient: GradientConfig,
    #[serde(default)]
    pub num_threads: Option<usize>,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl JsonIO for RunConfig {}

impl RunConfig {
    pub fn new(target: &str, sensitive: &[&str]) -> Self {
        RunConfig {
            target: target.to_string(),
            sensitive: sensitive.iter().map(|s| s.to_string()).collect(),
            seed: 0,
            test_fraction: default_test_fraction(),
            windows: default_windows(),
            dummy: false,
            strategy: Strategy::default(),
            game: GameConfig::default(),
            gradient: GradientConfig::default(),
            num_threads: None,
            failure_policy: FailurePolicy::default(),
        }
    }

    /// Parsed alpha windows.
    pub fn alpha_windows(&self) -> Result<Vec<AlphaWindow>, AuditError> {
        self.windows.iter().map(|[low, high]| AlphaWindow::new(*low, *high)).collect()
    }

    pub fn validate(&self) -> Result<(), AuditError> {
        validate_float_parameter(self.test_fraction, 0.0, 1.0, "test_fraction")?;
        if self.windows.is_empty() {
            return Err(AuditError::InvalidParameter(
                "windows".to_string(),
                "at least one alpha window".to_string(),
                "[]".to_string(),
            ));
        }
        self.alpha_windows()?;
        match self.strategy {
            Strategy::Game => self.game.validate(),
            Strategy::Gradient => self.gradient.validate(),
        }
    }
}

/// Run the full audit of `dataset` under `config`.
///
/// * `dataset` - Numeric table holding the target and every feature.
/// * `config` - Run configuration.
/// * `factory` - Expressivity source for each split; required by the game strategy.
pub fn run_system(
    dataset: &Dataset,
    config: &RunConfig,
    factory: Option<&dyn ExpressivityFactory>,
) -> Result<AuditReport, AuditError> {
    config.validate()?;
    let start = Instant::now();

    let mut dataset = dataset.clone();
    if config.dummy {
        dataset.shuffle_column(&config.target, config.seed)?;
    }
    let labeled = dataset.split_target(&config.target)?;
    let sensitive = config
        .sensitive
        .iter()
        .map(|name| {
            labeled
                .feature_names
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| AuditError::UnknownColumn(name.clone()))
        })
        .collect::<Result<Vec<usize>, AuditError>>()?;
    let (train, test) = labeled.train_test_split(config.test_fraction, config.seed)?;
    info!(
        "Running {} audit: {} train rows, {} test rows, {} features, sensitive {:?}.",
        config.strategy,
        train.x.rows,
        test.x.rows,
        labeled.feature_names.len(),
        config.sensitive
    );

    let train_x = train.x.view();
    let test_x = test.x.view();
    let mut providers: Option<(Box<dyn ExpressivityProvider>, Box<dyn ExpressivityProvider>)> = None;
    let strategy: Box<dyn SubgroupSearch> = match config.strategy {
        Strategy::Game => {
            let factory = factory.ok_or_else(|| AuditError::MissingExpressivity(Split::Train.to_string()))?;
            providers = Some((
                factory.explain(&train_x, Split::Train, config.seed)?,
                factory.explain(&test_x, Split::Test, config.seed)?,
            ));
            Box::new(GameSolver::new(config.game.clone()))
        }
        Strategy::Gradient => Box::new(GradientSolver::new(GradientConfig {
            seed: config.seed,
            ..config.gradient.clone()
        })),
    };

    let mut train_view = SplitView::new(Split::Train, train_x, &train.y);
    let mut test_view = SplitView::new(Split::Test, test_x, &test.y);
    if let Some((train_provider, test_provider)) = &providers {
        train_view = train_view.with_expressivity(train_provider.as_ref());
        test_view = test_view.with_expressivity(test_provider.as_ref());
    }

    let mut report = AuditReport::default();
    for window in config.alpha_windows()? {
        let rows = Auditor::new(strategy.as_ref(), &labeled.feature_names, &sensitive, window)
            .set_num_threads(config.num_threads)
            .set_failure_policy(config.failure_policy)
            .audit(&train_view, &test_view)?;
        report.extend(AuditReport::new(rows));
    }

    info!("Runtime: {:.2} seconds.", start.elapsed().as_secs_f64());
    Ok(report)
}

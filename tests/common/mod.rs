//! Common test utilities for integration tests
//!
//! Scanpy-style code fixtures, a harness wiring the mock adapters into an
//! orchestrator, and event helpers.

#![allow(dead_code)]

use std::sync::Arc;

use plancell::adapters::{MemoryArtifactWriter, MockExecutor, MockGenerator, MockOracle};
use plancell::domain::models::{AnalysisRequest, OrchestratorConfig, Plan, PlanEvent};
use plancell::services::{EventBus, OrchestratorPorts, PlanEventEnvelope, PlanOrchestrator};
use tokio::sync::broadcast;

pub const LOAD: &str = "import scanpy as sc\nadata = sc.read_h5ad(\"pbmc.h5ad\")";
pub const QC: &str = "sc.pp.filter_cells(adata, min_genes=200)";
pub const NORMALIZE: &str = "sc.pp.normalize_total(adata, target_sum=1e4)\nsc.pp.log1p(adata)";
pub const HVG: &str = "sc.pp.highly_variable_genes(adata, n_top_genes=2000)";
pub const DIMRED: &str = "sc.tl.pca(adata)\nsc.tl.umap(adata)";
pub const CLUSTER: &str = "sc.tl.leiden(adata, resolution=0.8)";
pub const MARKERS: &str = "sc.tl.rank_genes_groups(adata, \"leiden\")";
pub const PLOT: &str = "sc.pl.umap(adata, color=\"leiden\")";

/// Six steps whose code covers six core operations.
pub const COVERAGE_STEPS: [(&str, &str); 6] = [
    ("Load the data", LOAD),
    ("Run quality control", QC),
    ("Normalize the data", NORMALIZE),
    ("Select highly variable genes", HVG),
    ("Reduce dimensionality", DIMRED),
    ("Cluster the cells", CLUSTER),
];

/// Generator scripted with [`COVERAGE_STEPS`].
pub fn coverage_generator() -> MockGenerator {
    COVERAGE_STEPS
        .iter()
        .fold(MockGenerator::new(), |generator, (description, code)| {
            generator.with_code(description, code)
        })
}

pub fn request() -> AnalysisRequest {
    AnalysisRequest::new("Which cell populations are present in the PBMC sample?")
}

/// Mock adapters shared between the orchestrator and the assertions.
pub struct Harness {
    pub generator: Arc<MockGenerator>,
    pub executor: Arc<MockExecutor>,
    pub artifact: MemoryArtifactWriter,
    pub oracle: Arc<MockOracle>,
    pub events: Arc<EventBus>,
}

impl Harness {
    pub fn new(generator: MockGenerator, executor: MockExecutor, oracle: MockOracle) -> Self {
        Self {
            generator: Arc::new(generator),
            executor: Arc::new(executor),
            artifact: MemoryArtifactWriter::new(),
            oracle: Arc::new(oracle),
            events: EventBus::shared(),
        }
    }

    pub fn orchestrator(&self) -> PlanOrchestrator {
        self.orchestrator_with(OrchestratorConfig::default())
    }

    pub fn orchestrator_with(&self, config: OrchestratorConfig) -> PlanOrchestrator {
        let ports = OrchestratorPorts {
            generator: self.generator.clone(),
            executor: self.executor.clone(),
            artifact: Arc::new(self.artifact.clone()),
            oracle: self.oracle.clone(),
        };
        PlanOrchestrator::new(ports, config, Arc::clone(&self.events))
    }
}

/// Run a locked plan over [`COVERAGE_STEPS`] so the analysis is fully covered.
pub async fn cover_analysis(orchestrator: &mut PlanOrchestrator) {
    let mut plan = Plan::from_descriptions(COVERAGE_STEPS.iter().map(|(d, _)| *d), true);
    let summary = orchestrator.run(&request(), &mut plan).await.unwrap();
    assert_eq!(summary.completed, COVERAGE_STEPS.len());
    assert!(orchestrator.is_fully_covered());
}

/// Everything currently buffered on a bus receiver.
pub fn drain(rx: &mut broadcast::Receiver<PlanEventEnvelope>) -> Vec<PlanEventEnvelope> {
    let mut out = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        out.push(envelope);
    }
    out
}

pub fn events_named<'a>(envelopes: &'a [PlanEventEnvelope], name: &str) -> Vec<&'a PlanEvent> {
    envelopes
        .iter()
        .map(|e| &e.event)
        .filter(|event| event.name() == name)
        .collect()
}

/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

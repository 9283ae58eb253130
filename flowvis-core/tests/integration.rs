//! Integration tests for the evaluation engine.
//!
//! These tests drive a small volume pipeline (source -> filter -> viewer)
//! through the public API: data objects flow through typed ports, the filter
//! reads its input through a converted representation, and the evaluator
//! brings the network up to date on demand.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use flowvis_core::data::{ConverterRegistry, DataObject, Dimensions, Representation};
use flowvis_core::error::{NetworkError, PortError, ProcessError};
use flowvis_core::network::snapshot::{self, ProcessorFactory};
use flowvis_core::network::{NetworkEvaluator, PortAddress, ProcessorNetwork};
use flowvis_core::port::{DataInport, DataOutport, Inport, Outport};
use flowvis_core::processor::{InvalidationLevel, Processor, Progress};
use flowvis_core::tasks::TaskPool;

// ----------------------------------------------------------------------------
// Representations
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct RamVolume {
    dimensions: Dimensions,
    values: Vec<f32>,
}

impl RamVolume {
    fn filled(dimensions: Dimensions, value: f32) -> Self {
        let len = dimensions[0] * dimensions[1] * dimensions[2];
        Self {
            dimensions,
            values: vec![value; len],
        }
    }
}

impl Representation for RamVolume {
    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }
    fn set_dimensions(&mut self, dimensions: Dimensions) {
        self.dimensions = dimensions;
        let len = dimensions[0] * dimensions[1] * dimensions[2];
        self.values.resize(len, 0.0);
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
struct TextureVolume {
    dimensions: Dimensions,
    texels: Vec<f32>,
}

impl Representation for TextureVolume {
    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }
    fn set_dimensions(&mut self, dimensions: Dimensions) {
        self.dimensions = dimensions;
        let len = dimensions[0] * dimensions[1] * dimensions[2];
        self.texels.resize(len, 0.0);
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn registry() -> Arc<ConverterRegistry> {
    let mut registry = ConverterRegistry::new();
    registry.register(|ram: &RamVolume| TextureVolume {
        dimensions: ram.dimensions,
        texels: ram.values.clone(),
    });
    registry.register(|tex: &TextureVolume| RamVolume {
        dimensions: tex.dimensions,
        values: tex.texels.clone(),
    });
    Arc::new(registry)
}

// ----------------------------------------------------------------------------
// Processors
// ----------------------------------------------------------------------------

/// Seeds a fresh data object with a RAM volume.
struct VolumeSource {
    out: DataOutport<DataObject>,
    registry: Arc<ConverterRegistry>,
    value: f32,
    runs: Arc<AtomicUsize>,
}

impl VolumeSource {
    fn boxed(registry: &Arc<ConverterRegistry>, value: f32, runs: &Arc<AtomicUsize>) -> Box<dyn Processor> {
        Box::new(Self {
            out: DataOutport::new("volume"),
            registry: registry.clone(),
            value,
            runs: runs.clone(),
        })
    }
}

impl Processor for VolumeSource {
    fn type_key(&self) -> &'static str {
        "demo.volume_source"
    }
    fn inports(&self) -> Vec<&dyn Inport> {
        vec![]
    }
    fn inports_mut(&mut self) -> Vec<&mut dyn Inport> {
        vec![]
    }
    fn outports(&self) -> Vec<&dyn Outport> {
        vec![&self.out]
    }
    fn process(&mut self) -> Result<Progress, ProcessError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let data = DataObject::new(self.registry.clone());
        data.add_representation(RamVolume::filled([2, 2, 1], self.value));
        self.out.set_data(data);
        Ok(Progress::Done)
    }
}

/// Scales its input, reading through the texture representation so the
/// conversion path RAM -> texture is exercised inside the pipeline.
struct ScaleFilter {
    input: DataInport<DataObject>,
    out: DataOutport<DataObject>,
    registry: Arc<ConverterRegistry>,
    factor: Arc<Mutex<f32>>,
    fail: Arc<AtomicBool>,
    runs: Arc<AtomicUsize>,
}

impl ScaleFilter {
    fn boxed(
        registry: &Arc<ConverterRegistry>,
        factor: &Arc<Mutex<f32>>,
        fail: &Arc<AtomicBool>,
        runs: &Arc<AtomicUsize>,
    ) -> Box<dyn Processor> {
        Box::new(Self {
            input: DataInport::new("volume"),
            out: DataOutport::new("scaled"),
            registry: registry.clone(),
            factor: factor.clone(),
            fail: fail.clone(),
            runs: runs.clone(),
        })
    }
}

impl Processor for ScaleFilter {
    fn type_key(&self) -> &'static str {
        "demo.scale_filter"
    }
    fn inports(&self) -> Vec<&dyn Inport> {
        vec![&self.input]
    }
    fn inports_mut(&mut self) -> Vec<&mut dyn Inport> {
        vec![&mut self.input]
    }
    fn outports(&self) -> Vec<&dyn Outport> {
        vec![&self.out]
    }
    fn process(&mut self) -> Result<Progress, ProcessError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProcessError::new("filter is broken"));
        }
        let input = self
            .input
            .data()
            .ok_or_else(|| ProcessError::new("no input volume"))?;
        let factor = *self.factor.lock().unwrap();
        let scaled = input.with(|tex: &TextureVolume| TextureVolume {
            dimensions: tex.dimensions,
            texels: tex.texels.iter().map(|v| v * factor).collect(),
        })?;

        let data = DataObject::new(self.registry.clone());
        data.add_representation(scaled);
        self.out.set_data(data);
        Ok(Progress::Done)
    }
}

/// Records the first value of the RAM representation it receives.
struct Viewer {
    input: DataInport<DataObject>,
    observed: Arc<Mutex<Vec<f32>>>,
}

impl Viewer {
    fn boxed(observed: &Arc<Mutex<Vec<f32>>>) -> Box<dyn Processor> {
        Box::new(Self {
            input: DataInport::new("input"),
            observed: observed.clone(),
        })
    }
}

impl Processor for Viewer {
    fn type_key(&self) -> &'static str {
        "demo.viewer"
    }
    fn inports(&self) -> Vec<&dyn Inport> {
        vec![&self.input]
    }
    fn inports_mut(&mut self) -> Vec<&mut dyn Inport> {
        vec![&mut self.input]
    }
    fn outports(&self) -> Vec<&dyn Outport> {
        vec![]
    }
    fn process(&mut self) -> Result<Progress, ProcessError> {
        let input = self
            .input
            .data()
            .ok_or_else(|| ProcessError::new("no input volume"))?;
        let first = input.with(|ram: &RamVolume| ram.values[0])?;
        self.observed.lock().unwrap().push(first);
        Ok(Progress::Done)
    }
}

// ----------------------------------------------------------------------------
// Fixture
// ----------------------------------------------------------------------------

struct Pipeline {
    network: ProcessorNetwork,
    evaluator: NetworkEvaluator,
    source_runs: Arc<AtomicUsize>,
    filter_runs: Arc<AtomicUsize>,
    factor: Arc<Mutex<f32>>,
    fail: Arc<AtomicBool>,
    observed: Arc<Mutex<Vec<f32>>>,
}

fn pipeline(source_value: f32, factor_value: f32) -> Pipeline {
    let registry = registry();
    let source_runs = Arc::new(AtomicUsize::new(0));
    let filter_runs = Arc::new(AtomicUsize::new(0));
    let factor = Arc::new(Mutex::new(factor_value));
    let fail = Arc::new(AtomicBool::new(false));
    let observed = Arc::new(Mutex::new(Vec::new()));

    let mut network = ProcessorNetwork::new();
    network
        .add_processor("source", VolumeSource::boxed(&registry, source_value, &source_runs))
        .unwrap();
    network
        .add_processor("filter", ScaleFilter::boxed(&registry, &factor, &fail, &filter_runs))
        .unwrap();
    network
        .add_processor("viewer", Viewer::boxed(&observed))
        .unwrap();
    network
        .connect(
            PortAddress::new("source", "volume"),
            PortAddress::new("filter", "volume"),
        )
        .unwrap();
    network
        .connect(
            PortAddress::new("filter", "scaled"),
            PortAddress::new("viewer", "input"),
        )
        .unwrap();

    Pipeline {
        network,
        evaluator: NetworkEvaluator::new(),
        source_runs,
        filter_runs,
        factor,
        fail,
        observed,
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[test]
fn pipeline_evaluates_end_to_end() {
    let mut p = pipeline(2.0, 3.0);

    let report = p.evaluator.evaluate(&mut p.network).unwrap();
    assert_eq!(report.processed, vec!["source", "filter", "viewer"]);
    assert!(report.is_complete());

    // 2.0 scaled by 3.0, read back through texture -> RAM conversion.
    assert_eq!(*p.observed.lock().unwrap(), vec![6.0]);
}

#[test]
fn valid_network_is_not_reprocessed() {
    let mut p = pipeline(1.0, 1.0);
    p.evaluator.evaluate(&mut p.network).unwrap();

    let report = p.evaluator.evaluate(&mut p.network).unwrap();
    assert!(report.processed.is_empty());
    assert_eq!(p.source_runs.load(Ordering::SeqCst), 1);
    assert_eq!(p.filter_runs.load(Ordering::SeqCst), 1);
    assert_eq!(p.observed.lock().unwrap().len(), 1);
}

#[test]
fn property_change_reprocesses_only_downstream() {
    let mut p = pipeline(2.0, 1.0);
    p.evaluator.evaluate(&mut p.network).unwrap();

    // Changing the filter's factor invalidates it and everything below.
    *p.factor.lock().unwrap() = 5.0;
    let affected = p.network.invalidate("filter", InvalidationLevel::InvalidOutput);
    assert_eq!(affected, vec!["filter", "viewer"]);

    let report = p.evaluator.evaluate(&mut p.network).unwrap();
    assert_eq!(report.processed, vec!["filter", "viewer"]);

    // The source was never touched again.
    assert_eq!(p.source_runs.load(Ordering::SeqCst), 1);
    assert_eq!(*p.observed.lock().unwrap(), vec![2.0, 10.0]);
}

#[test]
fn process_failure_is_contained_and_recoverable() {
    let mut p = pipeline(1.0, 2.0);
    p.fail.store(true, Ordering::SeqCst);

    let report = p.evaluator.evaluate(&mut p.network).unwrap();
    assert_eq!(report.errored.len(), 1);
    assert_eq!(report.errored[0].0, "filter");
    // The source upstream of the failure still completed.
    assert!(report.processed.contains(&"source".to_string()));
    assert_eq!(
        p.network.state("filter").unwrap().error.as_deref(),
        Some("filter is broken")
    );
    assert!(!p.network.state("filter").unwrap().is_valid());

    // Fix the filter; the next pass retries it and clears the error.
    p.fail.store(false, Ordering::SeqCst);
    let report = p.evaluator.evaluate(&mut p.network).unwrap();
    assert!(report.processed.contains(&"filter".to_string()));
    assert!(p.network.state("filter").unwrap().error.is_none());
    assert_eq!(*p.observed.lock().unwrap(), vec![2.0]);
}

#[test]
fn mismatched_port_types_are_refused() {
    struct NumberSource {
        out: DataOutport<f32>,
    }
    impl Processor for NumberSource {
        fn type_key(&self) -> &'static str {
            "demo.number_source"
        }
        fn inports(&self) -> Vec<&dyn Inport> {
            vec![]
        }
        fn inports_mut(&mut self) -> Vec<&mut dyn Inport> {
            vec![]
        }
        fn outports(&self) -> Vec<&dyn Outport> {
            vec![&self.out]
        }
        fn process(&mut self) -> Result<Progress, ProcessError> {
            Ok(Progress::Done)
        }
    }

    let observed = Arc::new(Mutex::new(Vec::new()));
    let mut network = ProcessorNetwork::new();
    network
        .add_processor(
            "numbers",
            Box::new(NumberSource {
                out: DataOutport::new("out"),
            }),
        )
        .unwrap();
    network.add_processor("viewer", Viewer::boxed(&observed)).unwrap();

    let err = network
        .connect(
            PortAddress::new("numbers", "out"),
            PortAddress::new("viewer", "input"),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Port(PortError::IncompatibleTypes { .. })
    ));
    // The refused connection left the inport untouched.
    assert!(network.connections().is_empty());
}

#[test]
fn back_edge_is_refused() {
    let registry = registry();
    let runs = Arc::new(AtomicUsize::new(0));
    let factor = Arc::new(Mutex::new(1.0));
    let fail = Arc::new(AtomicBool::new(false));

    let mut network = ProcessorNetwork::new();
    network
        .add_processor("a", ScaleFilter::boxed(&registry, &factor, &fail, &runs))
        .unwrap();
    network
        .add_processor("b", ScaleFilter::boxed(&registry, &factor, &fail, &runs))
        .unwrap();
    network
        .connect(PortAddress::new("a", "scaled"), PortAddress::new("b", "volume"))
        .unwrap();

    let err = network
        .connect(PortAddress::new("b", "scaled"), PortAddress::new("a", "volume"))
        .unwrap_err();
    assert!(matches!(err, NetworkError::CycleDetected { .. }));
    assert_eq!(network.connections().len(), 1);
}

#[test]
fn colliding_identifiers_are_uniquified() {
    let registry = registry();
    let runs = Arc::new(AtomicUsize::new(0));

    let mut network = ProcessorNetwork::new();
    let first = network
        .add_processor("source", VolumeSource::boxed(&registry, 0.0, &runs))
        .unwrap();
    let second = network
        .add_processor("source", VolumeSource::boxed(&registry, 0.0, &runs))
        .unwrap();
    assert_eq!(first, "source");
    assert_eq!(second, "source 2");
}

#[test]
fn invalid_sink_raises_evaluate_request() {
    let mut p = pipeline(1.0, 1.0);
    p.evaluator.evaluate(&mut p.network).unwrap();

    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();
    p.network
        .on_evaluate_request(move |sink| seen.lock().unwrap().push(sink.to_string()));

    // Invalidating the source spreads to the viewer, the only sink.
    p.network.invalidate("source", InvalidationLevel::InvalidOutput);
    assert_eq!(*requests.lock().unwrap(), vec!["viewer"]);
}

#[test]
fn snapshot_restores_an_equivalent_network() {
    let p = pipeline(2.0, 3.0);
    let snap = snapshot::snapshot(&p.network);
    let json = snap.to_json().unwrap();

    let registry = registry();
    let source_runs = Arc::new(AtomicUsize::new(0));
    let filter_runs = Arc::new(AtomicUsize::new(0));
    let factor = Arc::new(Mutex::new(3.0));
    let fail = Arc::new(AtomicBool::new(false));
    let observed = Arc::new(Mutex::new(Vec::new()));

    let mut factory = ProcessorFactory::new();
    {
        let registry = registry.clone();
        let runs = source_runs.clone();
        factory.register("demo.volume_source", move || {
            VolumeSource::boxed(&registry, 2.0, &runs)
        });
    }
    {
        let registry = registry.clone();
        let (factor, fail, runs) = (factor.clone(), fail.clone(), filter_runs.clone());
        factory.register("demo.scale_filter", move || {
            ScaleFilter::boxed(&registry, &factor, &fail, &runs)
        });
    }
    {
        let observed = observed.clone();
        factory.register("demo.viewer", move || Viewer::boxed(&observed));
    }

    let parsed = snapshot::NetworkSnapshot::from_json(&json).unwrap();
    let mut restored = snapshot::restore(&parsed, &factory).unwrap();
    assert_eq!(restored.processor_count(), 3);

    // The restored network evaluates from scratch to the same result.
    let mut evaluator = NetworkEvaluator::new();
    let report = evaluator.evaluate(&mut restored).unwrap();
    assert!(report.is_complete());
    assert_eq!(*observed.lock().unwrap(), vec![6.0]);
}

#[test]
fn pending_work_finishes_on_a_later_pass() {
    /// Loads its volume on the task pool the first time through.
    struct AsyncLoader {
        out: DataOutport<DataObject>,
        registry: Arc<ConverterRegistry>,
        loaded: Arc<Mutex<Option<RamVolume>>>,
        pool: Arc<TaskPool>,
        identifier: String,
    }

    impl Processor for AsyncLoader {
        fn type_key(&self) -> &'static str {
            "demo.async_loader"
        }
        fn inports(&self) -> Vec<&dyn Inport> {
            vec![]
        }
        fn inports_mut(&mut self) -> Vec<&mut dyn Inport> {
            vec![]
        }
        fn outports(&self) -> Vec<&dyn Outport> {
            vec![&self.out]
        }
        fn process(&mut self) -> Result<Progress, ProcessError> {
            if let Some(volume) = self.loaded.lock().unwrap().take() {
                let data = DataObject::new(self.registry.clone());
                data.add_representation(volume);
                self.out.set_data(data);
                return Ok(Progress::Done);
            }
            let loaded = self.loaded.clone();
            self.pool.submit(self.identifier.clone(), move || {
                *loaded.lock().unwrap() = Some(RamVolume::filled([2, 2, 1], 4.0));
            });
            Ok(Progress::Pending)
        }
    }

    let registry = registry();
    let pool = Arc::new(TaskPool::new(1).unwrap());
    let observed = Arc::new(Mutex::new(Vec::new()));

    let mut network = ProcessorNetwork::new();
    network
        .add_processor(
            "loader",
            Box::new(AsyncLoader {
                out: DataOutport::new("volume"),
                registry: registry.clone(),
                loaded: Arc::new(Mutex::new(None)),
                pool: pool.clone(),
                identifier: "loader".to_string(),
            }),
        )
        .unwrap();
    network.add_processor("viewer", Viewer::boxed(&observed)).unwrap();
    network
        .connect(
            PortAddress::new("loader", "volume"),
            PortAddress::new("viewer", "input"),
        )
        .unwrap();

    let mut evaluator = NetworkEvaluator::new();
    let report = evaluator.evaluate(&mut network).unwrap();
    assert_eq!(report.pending, vec!["loader"]);
    assert!(observed.lock().unwrap().is_empty());

    // Poll until the background load lands, as an event loop would.
    let mut waited = 0;
    while pool.drain_completions(&mut network) == 0 {
        std::thread::sleep(std::time::Duration::from_millis(10));
        waited += 1;
        assert!(waited < 500, "background load never completed");
    }

    let report = evaluator.evaluate(&mut network).unwrap();
    assert!(report.is_complete());
    assert_eq!(*observed.lock().unwrap(), vec![4.0]);
}

#[test]
fn removing_a_processor_detaches_its_consumers() {
    let mut p = pipeline(1.0, 1.0);
    p.evaluator.evaluate(&mut p.network).unwrap();

    p.network.remove_processor("filter").unwrap();
    assert!(!p.network.contains("filter"));
    assert!(p.network.connections().is_empty());

    // The viewer lost its input: invalid again and skipped, not errored.
    assert!(!p.network.state("viewer").unwrap().is_valid());
    let report = p.evaluator.evaluate(&mut p.network).unwrap();
    assert_eq!(report.skipped_not_ready, vec!["viewer"]);
    assert!(report.errored.is_empty());
}

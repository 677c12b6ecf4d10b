//! End-to-end graph processing: the ordered execution loop, the worker
//! pool, callbacks, and the teardown gate.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use visiongraph::{
    CoreId, KernelGraph, KernelId, KernelNode, KernelStatus, Scheduler, SchedulerConfig,
    SectionComplete, StubManager, StubProvider,
};

fn cpu_manager() -> Arc<StubManager> {
    Arc::new(
        StubManager::new("cpu", CoreId::Cpu, 100)
            .with_kernel(KernelId::Sobel3x3, 5)
            .with_kernel(KernelId::Gaussian3x3, 5)
            .with_kernel(KernelId::Threshold, 2),
    )
}

async fn cpu_scheduler(cpu: Arc<StubManager>) -> Scheduler {
    Scheduler::builder()
        .provider(StubProvider::new(cpu))
        .build()
        .await
        .expect("discovery failed")
}

fn section_of(kernels: &[KernelId]) -> Vec<KernelNode> {
    kernels.iter().map(|&k| KernelNode::new(k)).collect()
}

/// Scenario: a single CPU manager at full capacity runs one section of
/// three nodes; the callback fires once with all three processed and every
/// node ends successful.
#[tokio::test]
async fn test_single_section_inline_execution() {
    let cpu = cpu_manager();
    let scheduler = cpu_scheduler(cpu.clone()).await;

    let mut graph = KernelGraph::new(1);
    graph
        .init_section(
            0,
            section_of(&[KernelId::Sobel3x3, KernelId::Gaussian3x3, KernelId::Threshold]),
        )
        .unwrap();
    let graph = Arc::new(graph);

    let calls: Arc<Mutex<Vec<(usize, u32)>>> = Arc::new(Mutex::new(Vec::new()));
    let on_complete: SectionComplete = {
        let calls = calls.clone();
        Arc::new(move |section, nodes| calls.lock().push((section, nodes)))
    };

    let sections_run = scheduler.process(&graph, Some(on_complete)).await;
    assert_eq!(sections_run, 1);
    assert_eq!(calls.lock().as_slice(), &[(0, 3)]);
    assert_eq!(cpu.executed(), 3);

    let section = graph.section(0).await.unwrap();
    for node in section.nodes() {
        assert_eq!(node.status, KernelStatus::Success);
        assert_eq!(node.perf.count(), 1);
    }
    assert_eq!(section.perf.count(), 1);
    drop(section);
    assert_eq!(graph.total_perf().count(), 1);
}

/// When every node resolves under every cap, every section runs.
#[tokio::test]
async fn test_all_sections_run() {
    let cpu = cpu_manager();
    let scheduler = cpu_scheduler(cpu.clone()).await;

    let mut graph = KernelGraph::new(4);
    for index in 0..4 {
        graph
            .init_section(index, section_of(&[KernelId::Sobel3x3]))
            .unwrap();
        graph.set_order(index, index as u32).unwrap();
    }
    let graph = Arc::new(graph);

    assert_eq!(scheduler.process(&graph, None).await, 4);
    assert_eq!(cpu.executed(), 4);
}

/// Contiguous nodes bound to the same manager dispatch as one run; a
/// change of manager starts a new run.
#[tokio::test]
async fn test_contiguous_runs_are_batched() {
    let cpu = cpu_manager();
    let dsp = Arc::new(
        StubManager::new("dsp", CoreId::Dsp, 500).with_kernel(KernelId::Gaussian7x7, 10),
    );
    let scheduler = Scheduler::builder()
        .provider(StubProvider::new(cpu.clone()))
        .provider(StubProvider::new(dsp.clone()))
        .build()
        .await
        .unwrap();

    // cpu, cpu, dsp, cpu: three runs, two on cpu and one on dsp.
    let nodes = vec![
        KernelNode::new(KernelId::Sobel3x3),
        KernelNode::new(KernelId::Threshold),
        KernelNode::new(KernelId::Gaussian7x7),
        KernelNode::new(KernelId::Gaussian3x3),
    ];
    let mut graph = KernelGraph::new(1);
    graph.init_section(0, nodes).unwrap();
    let graph = Arc::new(graph);

    assert_eq!(scheduler.process(&graph, None).await, 1);
    assert_eq!(cpu.runs(), 2);
    assert_eq!(cpu.executed(), 3);
    assert_eq!(dsp.runs(), 1);
    assert_eq!(dsp.executed(), 1);
}

/// A manager that under-delivers marks it on the nodes; later runs still
/// execute and the processed total stays below the node count.
#[tokio::test]
async fn test_under_delivery_does_not_abort_later_runs() {
    let cpu = Arc::new(
        StubManager::new("cpu", CoreId::Cpu, 100)
            .with_kernel(KernelId::Sobel3x3, 5)
            .deliver_at_most(1),
    );
    let dsp = Arc::new(
        StubManager::new("dsp", CoreId::Dsp, 500).with_kernel(KernelId::Gaussian7x7, 10),
    );
    let scheduler = Scheduler::builder()
        .provider(StubProvider::new(cpu.clone()))
        .provider(StubProvider::new(dsp.clone()))
        .build()
        .await
        .unwrap();

    let nodes = vec![
        KernelNode::new(KernelId::Sobel3x3),
        KernelNode::new(KernelId::Sobel3x3),
        KernelNode::new(KernelId::Gaussian7x7),
    ];
    let mut graph = KernelGraph::new(1);
    graph.init_section(0, nodes).unwrap();
    let graph = Arc::new(graph);

    let calls: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
    let on_complete: SectionComplete = {
        let calls = calls.clone();
        Arc::new(move |_, nodes| calls.lock().push(nodes))
    };
    assert_eq!(scheduler.process(&graph, Some(on_complete)).await, 1);

    // cpu processed 1 of its 2-node run; dsp still ran its node.
    assert_eq!(calls.lock().as_slice(), &[2]);
    assert_eq!(dsp.executed(), 1);
    let section = graph.section(0).await.unwrap();
    assert_eq!(section.nodes()[0].status, KernelStatus::Success);
    assert_eq!(section.nodes()[1].status, KernelStatus::Failure);
    assert_eq!(section.nodes()[2].status, KernelStatus::Success);
}

/// Sections at order N+1 never start before every order-N section has
/// invoked its completion callback.
#[tokio::test]
async fn test_order_barrier() {
    let cpu = Arc::new(
        StubManager::new("cpu", CoreId::Cpu, 1000)
            .with_kernel(KernelId::Sobel3x3, 5)
            .with_delay(Duration::from_millis(15)),
    );
    let scheduler = cpu_scheduler(cpu.clone()).await;

    let mut graph = KernelGraph::new(5);
    for index in 0..5 {
        graph
            .init_section(index, section_of(&[KernelId::Sobel3x3]))
            .unwrap();
    }
    // sections 0..=2 at order 0, section 3 at order 1, section 4 at order 2
    graph.set_order(3, 1).unwrap();
    graph.set_order(4, 2).unwrap();
    let graph = Arc::new(graph);

    let log: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
    let on_complete: SectionComplete = {
        let log = log.clone();
        Arc::new(move |section, _| log.lock().push(section))
    };
    assert_eq!(scheduler.process(&graph, Some(on_complete)).await, 5);

    let log = log.lock();
    let position = |s: usize| log.iter().position(|&x| x == s).unwrap();
    for early in 0..3 {
        assert!(position(early) < position(3), "order 0 must precede order 1");
    }
    assert!(position(3) < position(4), "order 1 must precede order 2");
}

/// Within one order level no more than `max_parallel_sections` sections
/// reach the managers at once.
#[tokio::test]
async fn test_parallelism_bounded_by_pool() {
    let cpu = Arc::new(
        StubManager::new("cpu", CoreId::Cpu, 1000)
            .with_kernel(KernelId::Sobel3x3, 5)
            .with_delay(Duration::from_millis(10)),
    );
    let config = SchedulerConfig {
        max_parallel_sections: 2,
        ..Default::default()
    };
    let scheduler = Scheduler::builder()
        .provider(StubProvider::new(cpu.clone()))
        .config(config)
        .build()
        .await
        .unwrap();

    let mut graph = KernelGraph::new(4);
    for index in 0..4 {
        graph
            .init_section(index, section_of(&[KernelId::Sobel3x3]))
            .unwrap();
        graph.set_order(index, (index / 2) as u32).unwrap();
    }
    let graph = Arc::new(graph);

    assert_eq!(scheduler.process(&graph, None).await, 4);
    assert!(cpu.max_in_flight() <= 2, "pool bound exceeded");
}

/// An order level holding more sections than the pool can run aborts the
/// whole call without executing anything.
#[tokio::test]
async fn test_too_many_sections_at_one_order_aborts() {
    let cpu = cpu_manager();
    let scheduler = cpu_scheduler(cpu.clone()).await;

    let mut graph = KernelGraph::new(5);
    for index in 0..5 {
        graph
            .init_section(index, section_of(&[KernelId::Sobel3x3]))
            .unwrap();
    }
    let graph = Arc::new(graph);

    assert_eq!(scheduler.process(&graph, None).await, 0);
    assert_eq!(cpu.executed(), 0);
}

/// Skipped sections are ignored by the processor but everything else runs.
#[tokio::test]
async fn test_skip_flag() {
    let cpu = cpu_manager();
    let scheduler = cpu_scheduler(cpu.clone()).await;

    let mut graph = KernelGraph::new(2);
    graph
        .init_section(0, section_of(&[KernelId::Sobel3x3]))
        .unwrap();
    graph
        .init_section(1, section_of(&[KernelId::Sobel3x3]))
        .unwrap();
    graph.set_skip(0, true).unwrap();
    let graph = Arc::new(graph);

    assert_eq!(scheduler.process(&graph, None).await, 1);
    assert_eq!(cpu.executed(), 1);
    let skipped = graph.section(0).await.unwrap();
    assert_eq!(skipped.nodes()[0].status, KernelStatus::Failure);
}

/// Teardown waits for in-flight graphs and rejects calls arriving after
/// it begins.
#[tokio::test]
async fn test_shutdown_drains_and_rejects() {
    let cpu = Arc::new(
        StubManager::new("cpu", CoreId::Cpu, 100)
            .with_kernel(KernelId::Sobel3x3, 5)
            .with_delay(Duration::from_millis(40)),
    );
    let scheduler = Arc::new(cpu_scheduler(cpu.clone()).await);

    let mut graph = KernelGraph::new(1);
    graph
        .init_section(0, section_of(&[KernelId::Sobel3x3]))
        .unwrap();
    let graph = Arc::new(graph);

    let running = {
        let scheduler = scheduler.clone();
        let graph = graph.clone();
        tokio::spawn(async move { scheduler.process(&graph, None).await })
    };
    // Let the in-flight call get past the gate before tearing down.
    tokio::time::sleep(Duration::from_millis(10)).await;

    let teardown = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.shutdown().await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;

    // A new call after teardown has begun is rejected immediately.
    assert_eq!(scheduler.process(&graph, None).await, 0);

    // The admitted call still completes and teardown then finishes.
    assert_eq!(running.await.unwrap(), 1);
    teardown.await.unwrap();
    assert_eq!(cpu.executed(), 1);
}

/// Verification is gated like processing: once teardown begins it reports
/// failure instead of touching the graph.
#[tokio::test]
async fn test_verify_rejected_after_shutdown() {
    let cpu = cpu_manager();
    let scheduler = cpu_scheduler(cpu).await;
    scheduler.shutdown().await;

    let mut graph = KernelGraph::new(1);
    graph
        .init_section(0, section_of(&[KernelId::Sobel3x3]))
        .unwrap();
    assert!(!scheduler.verify(&graph).await);
    assert!(!graph.verified());
}

/// Graph-total and per-section perf accumulate across repeated calls.
#[tokio::test]
async fn test_perf_accumulates_across_runs() {
    let cpu = cpu_manager();
    let scheduler = cpu_scheduler(cpu.clone()).await;

    let mut graph = KernelGraph::new(1);
    graph
        .init_section(0, section_of(&[KernelId::Sobel3x3]))
        .unwrap();
    let graph = Arc::new(graph);

    for _ in 0..3 {
        assert_eq!(scheduler.process(&graph, None).await, 1);
    }
    assert_eq!(graph.total_perf().count(), 3);
    let mut section = graph.section(0).await.unwrap();
    assert_eq!(section.perf.count(), 3);
    assert_eq!(section.nodes()[0].perf.count(), 3);
    assert!(section.perf.min() <= section.perf.max());

    section.clear_perf();
    assert_eq!(section.perf.count(), 0);
    assert_eq!(section.nodes()[0].perf.count(), 0);
}

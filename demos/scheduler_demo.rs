use std::sync::Arc;
use std::time::Duration;

use visiongraph::{
    CoreId, KernelGraph, KernelId, KernelNode, Scheduler, SectionComplete, StubManager,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("🚀 visiongraph scheduler starting...");

    // Two fake resources: a DSP that prefers the heavy filters and a CPU
    // that can run everything as a fallback.
    let dsp = Arc::new(
        StubManager::new("dsp", CoreId::Dsp, 500)
            .with_kernel(KernelId::Gaussian7x7, 40)
            .with_kernel(KernelId::Sobel3x3, 25)
            .with_delay(Duration::from_millis(5)),
    );
    let cpu = Arc::new(
        StubManager::new("cpu", CoreId::Cpu, 100)
            .with_kernel(KernelId::Gaussian7x7, 60)
            .with_kernel(KernelId::Sobel3x3, 30)
            .with_kernel(KernelId::Threshold, 10),
    );

    let scheduler = Scheduler::builder()
        .manager(dsp.clone())
        .manager(cpu.clone())
        .build()
        .await
        .expect("no usable manager");

    // Three sections: two independent filter chains at order 0, then a
    // threshold pass at order 1 once both are done.
    let mut graph = KernelGraph::new(3);
    graph
        .init_section(
            0,
            vec![
                KernelNode::new(KernelId::Gaussian7x7),
                KernelNode::new(KernelId::Sobel3x3),
            ],
        )
        .unwrap();
    graph
        .init_section(
            1,
            vec![
                KernelNode::new(KernelId::Gaussian7x7),
                KernelNode::new(KernelId::Sobel3x3),
            ],
        )
        .unwrap();
    graph
        .init_section(
            2,
            vec![KernelNode::new(KernelId::Threshold).with_affinity(CoreId::Cpu)],
        )
        .unwrap();
    graph.set_order(2, 1).unwrap();
    let graph = Arc::new(graph);

    println!("📋 Processing a 3-section graph (orders 0, 0, 1)...");

    let on_complete: SectionComplete = Arc::new(|section, nodes| {
        println!("✅ section {section} completed ({nodes} nodes)");
    });
    let sections_run = scheduler.process(&graph, Some(on_complete)).await;

    println!("\n{sections_run} sections ran");
    for index in 0..graph.num_sections() {
        let section = graph.section(index).await.unwrap();
        for (n, node) in section.nodes().iter().enumerate() {
            println!(
                "  section {index} node {n}: {:?} on {:?} -> {:?} ({} us)",
                node.kernel,
                node.binding().map(|b| b.core),
                node.status,
                node.perf.last().as_micros(),
            );
        }
    }
    println!(
        "graph wall time: {} us (dsp ran {} nodes, cpu ran {})",
        graph.total_perf().last().as_micros(),
        dsp.executed(),
        cpu.executed(),
    );

    scheduler.shutdown().await;
}

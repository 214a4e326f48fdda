use std::sync::Arc;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use shardgraph::config::{ENGINE_THREADS_PROPERTY, SCHEDULING_PROPERTY};
use shardgraph::{
    ChannelDescriptor, ChannelInstance, ChannelPayload, Configuration, ExecutionState, Job,
    OptimizationContext, PageRankOperator, PlanBuilder, Platform, Plugin, SchedulingPolicy,
    ShardGraphPlatform, ShardGraphPlugin,
};

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Scheduling {
    Propagate,
    ReadyCount,
}

impl From<Scheduling> for SchedulingPolicy {
    fn from(value: Scheduling) -> Self {
        match value {
            Scheduling::Propagate => SchedulingPolicy::Propagate,
            Scheduling::ReadyCount => SchedulingPolicy::ReadyCount,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "shardgraph", version, about = "Run graph jobs on the ShardGraph platform")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute PageRank over an edge list file.
    Pagerank {
        /// Edge list, one `src dst [weight]` per line.
        edges: Utf8PathBuf,
        /// Where to write the `(u32 id, f32 rank)` records.
        output: Utf8PathBuf,
        #[arg(short, long, default_value_t = shardgraph::operators::DEFAULT_ITERATIONS)]
        iterations: usize,
        /// Engine worker threads.
        #[arg(short, long)]
        threads: Option<usize>,
        #[arg(long, value_enum, default_value = "propagate")]
        scheduling: Scheduling,
        /// Print this many top ranked vertices.
        #[arg(long, default_value_t = 10)]
        top: usize,
        /// Write the partial execution reports as JSON to this file.
        #[arg(long)]
        report: Option<Utf8PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    shardgraph::init_logging();

    let args = Args::parse();

    match args.command {
        Command::Pagerank {
            edges,
            output,
            iterations,
            threads,
            scheduling,
            top,
            report,
        } => {
            let state = pagerank(edges, output, iterations, threads, scheduling.into(), top)?;
            if let Some(path) = report {
                std::fs::write(&path, state.to_json()?)
                    .with_context(|| format!("Couldn't write report to {path}"))?;
                eprintln!("{} report to {path}", style("Wrote").green());
            }
            Ok(())
        }
    }
}

fn pagerank(
    edges: Utf8PathBuf,
    output: Utf8PathBuf,
    iterations: usize,
    threads: Option<usize>,
    scheduling: SchedulingPolicy,
    top: usize,
) -> anyhow::Result<ExecutionState> {
    eprintln!(
        "Running {} on {}.",
        style("PageRank").red(),
        style("ShardGraph").blue()
    );

    let platform = Arc::new(ShardGraphPlatform::new());
    let plugin = ShardGraphPlugin::new(platform.clone());

    let mut config = Configuration::new();
    platform.configure_defaults(&mut config);
    plugin.set_properties(&mut config);
    config.set_property(SCHEDULING_PROPERTY, scheduling.to_string());
    if let Some(threads) = threads {
        config.set_property(ENGINE_THREADS_PROPERTY, threads.to_string());
    }

    let job = Job::new(format!("cli-{}", std::process::id()), config).with_name("pagerank");

    let mut builder = PlanBuilder::new();
    let stage = builder.add_stage();
    let input = builder.add_channel(ChannelDescriptor::file_at(edges.clone()));
    let ranks = builder.add_channel(ChannelDescriptor::file_at(output.clone()));
    builder.add_task(
        stage,
        Arc::new(PageRankOperator::new(iterations)),
        &[input],
        &[ranks],
    )?;
    let plan = builder.finish()?;
    tracing::debug!("Plan:\n{plan}");

    let mut state = ExecutionState::new();
    state.register(ChannelInstance::external(
        input,
        ChannelPayload::File { path: edges },
    ));

    let context = OptimizationContext::new(job.configuration().clone());
    let mut executor = (platform.executor_factory())(&job)?;
    let result = executor.execute_stage(&plan, stage, &context, &mut state);
    executor.dispose();
    result?;

    let mut records = read_ranks(&output)?;
    records.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    eprintln!("{} {} vertices", style("Ranked").green(), records.len());
    for (id, rank) in records.iter().take(top) {
        println!("{id}\t{rank:.6}");
    }

    for pe in state.partial_executions() {
        eprintln!(
            "{} {} ({}) in {}",
            style("Executed").green(),
            pe.operator(),
            pe.task(),
            style(format!("{:.2?}", pe.duration())).yellow()
        );
    }

    Ok(state)
}

fn read_ranks(path: &Utf8PathBuf) -> anyhow::Result<Vec<(u32, f32)>> {
    let bytes = std::fs::read(path).with_context(|| format!("Couldn't read {path}"))?;

    Ok(bytes
        .chunks_exact(8)
        .map(|r| {
            (
                u32::from_be_bytes([r[0], r[1], r[2], r[3]]),
                f32::from_be_bytes([r[4], r[5], r[6], r[7]]),
            )
        })
        .collect())
}

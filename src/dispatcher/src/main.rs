// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! The dispatcher binary: the composition root wiring the `Havok` registry,
//! hash-fanout proxy, reporter, job state machine and the fetch/merge/time
//! wheel pipeline into the gRPC and HTTP surfaces replayers and operators
//! talk to.

mod config;
mod fetch;
mod grpc;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use havok::{ConsoleReportHandler, HavokService, LogReportHandler, ReplayerManager, ReplayerProxy, ReportHandler, Reporter};
use havok_proto::havok_server::HavokServer;
use havok_types::JobConfiguration;
use job::{Job, Starter};
use merge::{FetcherRegistry, VecFetcher};

use crate::config::DispatcherConfig;
use crate::fetch::PipelineConfig;
use crate::grpc::GrpcHavok;

#[derive(Parser, Debug)]
#[command(name = "havok-dispatcher")]
struct Args {
    /// Path to a TOML configuration file; defaults are used when omitted.
    #[arg(long)]
    config: Option<String>,
}

fn build_fetcher_registry() -> FetcherRegistry {
    let mut registry = FetcherRegistry::new();
    // Concrete source adapters (file, Kafka, object-store log exporters, ...)
    // register against this same registry from outside this crate; "demo"
    // is the only source shipped here, for smoke-testing a dispatcher with
    // no adapter wired up yet.
    registry.register("demo", || Box::new(VecFetcher::new("demo", Vec::new())));
    registry
}

fn build_reporter(manager: Arc<ReplayerManager>, config: &config::ReporterSection) -> Arc<Reporter> {
    let mut handlers: Vec<Arc<dyn ReportHandler>> = Vec::new();
    if config.console {
        handlers.push(Arc::new(ConsoleReportHandler));
    }
    if config.log {
        handlers.push(Arc::new(LogReportHandler));
    }
    Reporter::new(
        manager,
        config.collect_interval.0,
        config.timeout.0,
        handlers,
    )
}

fn build_starter(
    registry: Arc<FetcherRegistry>,
    sources: Vec<String>,
    job: JobConfiguration,
    timewheel_interval: std::time::Duration,
    havok: Arc<HavokService>,
) -> Starter {
    Box::new(move |notify_tx| {
        // begin_ms/end_ms/speed are fixed for the lifetime of a run (only
        // `rate`/`stuck_ms` are live-adjustable via shake/strike), so
        // capturing the configuration once here matches the job's own
        // snapshot at start().
        let pipeline_config = PipelineConfig {
            sources,
            job,
            timewheel_interval,
        };
        fetch::spawn_pipeline(registry, pipeline_config, havok, notify_tx);
    })
}

fn main() {
    let args = Args::parse();
    let config = match args.config {
        Some(path) => DispatcherConfig::from_file(&path),
        None => DispatcherConfig::default(),
    };

    let _log_level = logger::init_log(&config.logger);
    logger::info!("starting dispatcher"; "config" => format!("{:?}", config));

    let runtimes = runtime::build_engine_runtimes(config.runtime.net_threads, config.runtime.send_threads)
        .expect("failed to build tokio runtimes");

    let manager = Arc::new(ReplayerManager::new());
    let proxy = Arc::new(ReplayerProxy::new(havok::default_hash_fn()));
    let reporter = build_reporter(manager.clone(), &config.reporter);
    reporter.spawn();

    let havok_service = HavokService::new(manager, proxy, reporter);
    havok_service.spawn_keep_alive(config.service.keepalive_interval.0);

    let registry = Arc::new(build_fetcher_registry());
    let job_config: JobConfiguration = (&config.job).into();
    let starter = build_starter(
        registry,
        config.fetcher.sources.clone(),
        job_config,
        config.timewheel.interval.0,
        havok_service.clone(),
    );
    let job = Job::new(job_config, havok_service.clone(), starter).expect("invalid job configuration");

    let app_state = job::AppState {
        job: job.clone(),
        havok: havok_service.clone(),
    };
    let http_router = job::router(app_state);

    let http_addr: SocketAddr = config.service.http_addr.parse().expect("invalid http_addr");
    let grpc_addr: SocketAddr = config.service.grpc_addr.parse().expect("invalid grpc_addr");

    let net_runtime = runtimes.net_runtime.clone();
    net_runtime.spawn(async move {
        if let Err(e) = axum::Server::bind(&http_addr)
            .serve(http_router.into_make_service())
            .await
        {
            logger::error!("http server exited"; "error" => e.to_string());
        }
    });

    let grpc_havok = GrpcHavok(havok_service.clone());
    net_runtime.spawn(async move {
        if let Err(e) = tonic::transport::Server::builder()
            .add_service(HavokServer::new(grpc_havok))
            .serve(grpc_addr)
            .await
        {
            logger::error!("grpc server exited"; "error" => e.to_string());
        }
    });

    runtimes.net_runtime.block_on(async move {
        let _ = tokio::signal::ctrl_c().await;
        logger::info!("received shutdown signal");
        job.stop();
    });
}

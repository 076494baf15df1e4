// src/main.rs

use std::fs;
use std::io::Read;
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use rust_adx_compat::bidding::outbound::{prepare_outbound, DEFAULT_MAX_IMPS};
use rust_adx_compat::openrtb::request::BidRequest;

#[derive(Parser, Debug)]
#[command(
    author = "whiteCcinn",
    version = "1.0",
    about = "An OpenRTB 2.6 to 2.5 downgrade shim"
)]
struct CliArgs {
    /// 输入文件，缺省从 stdin 读取 2.6 BidRequest JSON
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// 降级前把 pod imp 展开为离散 imp
    #[arg(long, default_value_t = false)]
    expand_pods: bool,
    /// 出站 imp 上限
    #[arg(long, default_value_t = DEFAULT_MAX_IMPS)]
    max_imps: usize,
}

fn main() {
    let args = CliArgs::parse();

    // 初始化全局 tracing 日志，业务输出走 stdout，日志走 stderr
    let subscriber = Registry::default()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().json().with_writer(std::io::stderr));
    tracing::subscriber::set_global_default(subscriber)
        .expect("Unable to set global tracing subscriber");

    let payload = match &args.input {
        Some(path) => fs::read_to_string(path).expect("Unable to read input file"),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .expect("Unable to read stdin");
            buf
        }
    };

    let mut request: BidRequest =
        serde_json::from_str(&payload).expect("Unable to parse bid request");

    let dropped = prepare_outbound(&mut request, args.max_imps, args.expand_pods)
        .expect("Unable to downgrade request with malformed ext");
    for err in &dropped {
        warn!(error = %err, "imp dropped from outbound request");
    }
    info!(
        request_id = %request.id,
        imp_count = request.imp.len(),
        "request downgraded to 2.5"
    );

    println!(
        "{}",
        serde_json::to_string(&request).expect("Unable to serialize request")
    );
}

mod assets;
mod camera;
mod input;
mod logging;
mod models;
mod scenario;
mod scene;
mod simulation;

use std::path::PathBuf;

use clap::{Arg, ArgAction, Command};
use tracing::info;

use assets::spawn_model_load;
use logging::{init_logging, level_for_verbosity, parse_log_level, LogConfig, LogOutput};
use scenario::ScenarioConfig;
use scene::{HeadlessScene, SceneGraph, Viewport};
use simulation::{SimulationEngine, SimulationStats};

fn main() {
    let matches = Command::new("auto_flight")
        .version("0.1.0")
        .about("戦闘機自動飛行デモ (Auto Flight)")
        .long_about("周回飛行する戦闘機とホーミングミサイルのバースト攻撃を再現する\n\
                     フレーム駆動シミュレーションです。描画はヘッドレスで行い、\n\
                     各フレームの状態をトレースとして出力できます。")
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("シナリオファイル(.yaml)のパスを指定")
                .long_help("実行するシナリオファイル(.yaml)のパスを指定します。\n\
                           指定しない場合、既定値のシナリオで実行されます。"),
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(ArgAction::SetTrue)
                .help("シナリオの情報のみ表示して終了"),
        )
        .arg(
            Arg::new("duration")
                .short('d')
                .long("duration")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(f64))
                .help("実行時間[s]をシナリオの値から上書き"),
        )
        .arg(
            Arg::new("trace")
                .long("trace")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("フレームトレース(JSON Lines)の出力先"),
        )
        .arg(
            Arg::new("realtime")
                .long("realtime")
                .action(ArgAction::SetTrue)
                .help("実時間に合わせてフレームを進める"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .default_value("info")
                .help("ログレベル (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("TARGET")
                .default_value("console")
                .value_parser(|s: &str| s.parse::<LogOutput>())
                .help("ログ出力先 (console, file, both)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("詳細出力レベル (-v: デバッグ, -vv: トレース)"),
        )
        .get_matches();

    println!("戦闘機自動飛行デモ (Auto Flight) - auto_flight v0.1.0");
    println!();

    let options = RunOptions {
        scenario_path: matches.get_one::<String>("scenario").map(PathBuf::from),
        info_only: matches.get_flag("info"),
        duration: matches.get_one::<f64>("duration").copied(),
        trace_path: matches.get_one::<PathBuf>("trace").cloned(),
        realtime: matches.get_flag("realtime"),
        log: LogConfig {
            level: level_for_verbosity(
                parse_log_level(matches.get_one::<String>("log-level").map_or("info", String::as_str)),
                matches.get_count("verbose"),
            ),
            output: matches.get_one::<LogOutput>("log-output").copied().unwrap_or(LogOutput::Console),
            ..LogConfig::default()
        },
    };

    if let Err(e) = run(options) {
        eprintln!("エラー: {}", e);
        std::process::exit(1);
    }
}

struct RunOptions {
    scenario_path: Option<PathBuf>,
    info_only: bool,
    duration: Option<f64>,
    trace_path: Option<PathBuf>,
    realtime: bool,
    log: LogConfig,
}

/// シナリオを読み込み、コマンドライン指定で上書きする
fn load_scenario(options: &RunOptions) -> Result<ScenarioConfig, Box<dyn std::error::Error>> {
    let mut scenario = match &options.scenario_path {
        Some(path) => ScenarioConfig::from_file(path)?,
        None => ScenarioConfig::default(),
    };

    if let Some(duration) = options.duration {
        scenario.sim.duration_s = duration;
    }
    if options.trace_path.is_some() {
        scenario.output.trace_path = options.trace_path.clone();
    }
    if options.realtime {
        scenario.sim.realtime = true;
    }
    scenario.validate()?;
    Ok(scenario)
}

fn run(options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = load_scenario(&options)?;

    if options.info_only {
        scenario.print_summary();
        return Ok(());
    }

    // ファイル出力のガードは実行終了まで保持する
    let _log_guard = init_logging(&options.log)?;

    scenario.print_summary();
    println!();

    match &options.scenario_path {
        Some(path) => info!(scenario = %path.display(), "シナリオファイル読み込み完了"),
        None => info!("シナリオ未指定のため既定値で実行します"),
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("asset-loader")
        .enable_all()
        .build()?;
    let mut pending = spawn_model_load(runtime.handle(), scenario.asset.model_path.clone());

    let viewport = Viewport::new(scenario.viewport.width, scenario.viewport.height, scenario.camera.fov_deg);
    let scene: Box<dyn SceneGraph> = match &scenario.output.trace_path {
        Some(path) => Box::new(HeadlessScene::with_trace(viewport, path)?),
        None => Box::new(HeadlessScene::new(viewport)),
    };

    let mut engine = SimulationEngine::new(scenario, scene);
    let stats = engine.run(&mut pending)?;
    print_stats(&stats);

    runtime.shutdown_background();
    Ok(())
}

fn print_stats(stats: &SimulationStats) {
    println!();
    println!("=== 実行結果 ===");
    println!("フレーム数: {} ({:.2}秒)", stats.frames, stats.sim_time);
    match stats.model_loaded_at {
        Some(t) => println!("モデル読み込み: {:.2}秒", t),
        None => println!("モデル読み込み: 失敗"),
    }
    println!("発射ミサイル: {}発 ({}バースト)", stats.missiles_spawned, stats.bursts);
    println!("  命中: {}", stats.direct_hits);
    println!("  通過後自爆: {}", stats.flyby_detonations);
    println!("  寿命切れ: {}", stats.timeouts);
    println!("  目標喪失: {}", stats.target_lost);
    println!("回避機動: {}回", stats.evasions);
}

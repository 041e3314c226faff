mod error;
mod logging;
mod models;
mod process;
mod project;
mod simulation;

use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use tracing::{debug, error};

use error::Result;
use logging::{LogConfig, LogOutput, init_logging, level_from_verbosity, parse_log_level};
use models::IToolRunner;
use process::{DryRunRunner, ShellRunner};
use project::{ConfigError, ProjectConfig};
use simulation::TwoPhaseEngine;

fn build_cli() -> Command {
    Command::new("twophase")
        .version(env!("CARGO_PKG_VERSION"))
        .about("2フェーズ法による昼光シミュレーション (Radiance)")
        .long_about(
            "Radiance の gendaymtx / rfluxmtx / rmtxop を順に呼び出し、\n\
             センサー点ごとの年間照度（または日射量）プロファイルを作成します。\n\
             出力は作業ディレクトリの temp/ dc/ res/ に書き込まれます。",
        )
        .arg(
            Arg::new("octree")
                .value_name("OCT")
                .value_parser(value_parser!(PathBuf))
                .required_unless_present("config")
                .help("octreeファイルのパス"),
        )
        .arg(
            Arg::new("climate")
                .value_name("CLIM")
                .value_parser(value_parser!(PathBuf))
                .required_unless_present("config")
                .help("気象ファイルのパス (.epw または .wea)"),
        )
        .arg(
            Arg::new("options")
                .value_name("OPT")
                .value_parser(value_parser!(PathBuf))
                .required_unless_present("config")
                .help("ambient パラメータのオプションファイル"),
        )
        .arg(
            Arg::new("points")
                .value_name("PTS")
                .value_parser(value_parser!(PathBuf))
                .num_args(1..)
                .action(ArgAction::Append)
                .required_unless_present("config")
                .help("センサー点ファイル (複数指定可)"),
        )
        .arg(
            Arg::new("subdivision")
                .long("mf")
                .value_name("N")
                .value_parser(value_parser!(u32))
                .help("天空分割係数 [既定: 2]"),
        )
        .arg(
            Arg::new("timestep")
                .long("ts")
                .value_name("MIN")
                .value_parser(value_parser!(u32))
                .help("時間刻み（分）、60の約数または倍数 [既定: 60]"),
        )
        .arg(
            Arg::new("rotation")
                .short('r')
                .long("rotation")
                .value_name("DEG")
                .value_parser(value_parser!(i32))
                .allow_negative_numbers(true)
                .help("天空回転（北から西回り、度） [既定: 0]"),
        )
        .arg(
            Arg::new("irr")
                .long("irr")
                .action(ArgAction::SetTrue)
                .help("日射量プロファイルを計算"),
        )
        .arg(
            Arg::new("direct")
                .long("direct")
                .action(ArgAction::SetTrue)
                .help("直達成分のみを計算"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("プロジェクト設定ファイル(.yaml)")
                .long_help(
                    "プロジェクト設定ファイル(.yaml)のパスを指定します。\n\
                     コマンドライン引数で指定した値は設定ファイルより優先されます。",
                ),
        )
        .arg(
            Arg::new("work_dir")
                .short('w')
                .long("work-dir")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("temp/ dc/ res/ を作成するディレクトリ [既定: .]"),
        )
        .arg(
            Arg::new("nproc")
                .long("nproc")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help("rfluxmtx のプロセス数 [既定: 論理CPU数]"),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .action(ArgAction::SetTrue)
                .help("外部コマンドが失敗したら中断する"),
        )
        .arg(
            Arg::new("copy_wea")
                .long("copy-wea")
                .action(ArgAction::SetTrue)
                .help(".wea を temp/ へ移動せずにコピーする"),
        )
        .arg(
            Arg::new("dry_run")
                .short('n')
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("実行するコマンドを表示するだけで実行しない")
                .conflicts_with("info"),
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(ArgAction::SetTrue)
                .help("設定と出力ファイル名を表示して終了"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("詳細出力レベル (-v: 詳細, -vv: デバッグ)"),
        )
        .arg(
            Arg::new("log_output")
                .long("log-output")
                .value_name("TARGET")
                .value_parser(["console", "file", "both"])
                .default_value("console")
                .help("ログ出力先"),
        )
        .arg(
            Arg::new("log_level")
                .long("log-level")
                .value_name("LEVEL")
                .default_value("info")
                .help("ログレベル (trace, debug, info, warn, error)"),
        )
}

/// 設定ファイルとコマンドライン引数からプロジェクト設定を組み立てる
fn build_config(matches: &ArgMatches) -> std::result::Result<ProjectConfig, ConfigError> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => ProjectConfig::from_file(path)?,
        None => ProjectConfig::default(),
    };

    if let Some(p) = matches.get_one::<PathBuf>("octree") {
        config.inputs.octree = Some(p.clone());
    }
    if let Some(p) = matches.get_one::<PathBuf>("climate") {
        config.inputs.climate = Some(p.clone());
    }
    if let Some(p) = matches.get_one::<PathBuf>("options") {
        config.inputs.options = Some(p.clone());
    }
    if let Some(points) = matches.get_many::<PathBuf>("points") {
        config.inputs.points = points.cloned().collect();
    }
    if let Some(&mf) = matches.get_one::<u32>("subdivision") {
        config.sky.subdivision = mf;
    }
    if let Some(&ts) = matches.get_one::<u32>("timestep") {
        config.sky.timestep_min = ts;
    }
    if let Some(&r) = matches.get_one::<i32>("rotation") {
        config.sky.rotation_deg = r;
    }
    if let Some(dir) = matches.get_one::<PathBuf>("work_dir") {
        config.run.work_dir = dir.clone();
    }
    if let Some(&n) = matches.get_one::<usize>("nproc") {
        config.run.nproc = Some(n);
    }

    // フラグは指定された場合のみ設定ファイルの値を上書き
    config.mode.irradiance |= matches.get_flag("irr");
    config.mode.direct |= matches.get_flag("direct");
    config.run.strict |= matches.get_flag("strict");
    config.run.copy_wea |= matches.get_flag("copy_wea");
    config.run.dry_run |= matches.get_flag("dry_run");

    Ok(config)
}

fn log_config(matches: &ArgMatches) -> LogConfig {
    let base = matches
        .get_one::<String>("log_level")
        .map(|s| parse_log_level(s))
        .unwrap_or(tracing::Level::INFO);
    let output = matches
        .get_one::<String>("log_output")
        .and_then(|s| s.parse::<LogOutput>().ok())
        .unwrap_or(LogOutput::Console);

    LogConfig {
        level: level_from_verbosity(base, matches.get_count("verbose")),
        output,
        ..LogConfig::default()
    }
}

fn main() {
    let matches = build_cli().get_matches();

    let guard = match init_logging(&log_config(&matches)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("警告: ログの初期化に失敗しました: {}", e);
            None
        }
    };

    let code = match run(&matches) {
        Ok(()) => 0,
        Err(e) => {
            error!("{}", e);
            eprintln!("エラー: {}", e);
            1
        }
    };

    // 非同期ログを書き出してから終了
    drop(guard);
    std::process::exit(code);
}

fn run(matches: &ArgMatches) -> Result<()> {
    let verbose_level = matches.get_count("verbose");
    let config = build_config(matches)?;
    debug!("プロジェクト設定: {:?}", config);

    if matches.get_flag("info") {
        config.print_summary();
        println!();
        let engine = TwoPhaseEngine::new(config, DryRunRunner::new(), verbose_level)?;
        engine.print_plan();
        return Ok(());
    }

    if config.run.dry_run {
        execute(config, DryRunRunner::new(), verbose_level)
    } else {
        execute(config, ShellRunner::new(), verbose_level)
    }
}

fn execute<R: IToolRunner>(config: ProjectConfig, runner: R, verbose_level: u8) -> Result<()> {
    let mut engine = TwoPhaseEngine::new(config, runner, verbose_level)?;
    engine.initialize()?;
    let summary = engine.run()?;
    println!();
    summary.print();
    Ok(())
}

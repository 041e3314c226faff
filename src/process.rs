//! # Process モジュール
//!
//! 外部ツール（Radiance）の呼び出しを表現・実行します。
//!
//! コマンドはシェル文字列ではなくプログラム名と引数のリストとして組み立て、
//! 複数段のパイプラインと標準入出力のリダイレクトをRust側で接続します。
//! ログやドライラン表示のためにシェル形式の文字列へ変換できます。
//!
//! - `ShellRunner`: 実際にプロセスを起動し、各段の終了ステータスを収集
//! - `DryRunRunner`: 何も実行せず、コマンドを記録・表示のみ

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use tracing::{debug, info};

use crate::error::{Result, TwoPhaseError};
use crate::models::traits::IToolRunner;

/// 1つの外部コマンド（プログラムと引数）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// 標準入出力のリダイレクト付きコマンドパイプライン
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<ToolCommand>,
    /// 先頭段の標準入力
    pub stdin: Option<PathBuf>,
    /// 最終段の標準出力
    pub stdout: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(first: ToolCommand) -> Self {
        Self {
            stages: vec![first],
            stdin: None,
            stdout: None,
        }
    }

    pub fn pipe(mut self, next: ToolCommand) -> Self {
        self.stages.push(next);
        self
    }

    pub fn stdin_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    /// 各段のプログラム名
    #[cfg(test)]
    pub fn programs(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.program.as_str()).collect()
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{}", stage)?;
            if i == 0 {
                if let Some(stdin) = &self.stdin {
                    write!(f, " < {}", shell_quote(&stdin.to_string_lossy()))?;
                }
            }
        }
        if let Some(stdout) = &self.stdout {
            write!(f, " > {}", shell_quote(&stdout.to_string_lossy()))?;
        }
        Ok(())
    }
}

fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./@+=:,".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// 1段の終了状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageStatus {
    pub program: String,
    /// シグナル終了の場合は None
    pub code: Option<i32>,
    pub success: bool,
}

impl StageStatus {
    fn from_exit(program: &str, status: ExitStatus) -> Self {
        Self {
            program: program.to_string(),
            code: status.code(),
            success: status.success(),
        }
    }
}

/// パイプライン実行結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecReport {
    pub command: String,
    pub stages: Vec<StageStatus>,
    /// ドライランで実行されなかった
    pub skipped: bool,
}

impl ExecReport {
    pub fn success(&self) -> bool {
        self.skipped || self.stages.iter().all(|s| s.success)
    }

    /// 失敗した段の説明
    pub fn failures(&self) -> Vec<String> {
        self.stages
            .iter()
            .filter(|s| !s.success)
            .map(|s| match s.code {
                Some(code) => format!("{} (終了コード {})", s.program, code),
                None => format!("{} (シグナルにより終了)", s.program),
            })
            .collect()
    }
}

/// 実際に外部プロセスを起動するランナー
#[derive(Debug, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }

    fn spawn_all(pipeline: &Pipeline) -> Result<Vec<(String, Child)>> {
        let mut children: Vec<(String, Child)> = Vec::new();
        let last = pipeline.stages.len().saturating_sub(1);

        // シェルのリダイレクトと同様、コマンド起動前に出力ファイルを作成する
        let mut stdout_file = match &pipeline.stdout {
            Some(path) => Some(File::create(path).map_err(|e| TwoPhaseError::io(path, e))?),
            None => None,
        };

        for (i, stage) in pipeline.stages.iter().enumerate() {
            let stdin = match children.last_mut() {
                Some((_, prev)) => prev.stdout.take().map(Stdio::from).unwrap_or_else(Stdio::null),
                None => match &pipeline.stdin {
                    Some(path) => {
                        Stdio::from(File::open(path).map_err(|e| TwoPhaseError::io(path, e))?)
                    }
                    None => Stdio::inherit(),
                },
            };
            let stdout = if i == last {
                match stdout_file.take() {
                    Some(file) => Stdio::from(file),
                    None => Stdio::inherit(),
                }
            } else {
                Stdio::piped()
            };

            let spawned = Command::new(&stage.program)
                .args(&stage.args)
                .stdin(stdin)
                .stdout(stdout)
                .spawn();

            match spawned {
                Ok(child) => children.push((stage.program.clone(), child)),
                Err(source) => {
                    for (_, mut child) in children {
                        let _ = child.kill();
                        let _ = child.wait();
                    }
                    return Err(TwoPhaseError::Spawn {
                        program: stage.program.clone(),
                        source,
                    });
                }
            }
        }

        Ok(children)
    }
}

impl IToolRunner for ShellRunner {
    fn run(&mut self, pipeline: &Pipeline) -> Result<ExecReport> {
        let command = pipeline.to_string();
        debug!("実行: {}", command);

        let children = Self::spawn_all(pipeline)?;
        let mut stages = Vec::with_capacity(children.len());
        for (program, mut child) in children {
            let status = child.wait().map_err(|source| TwoPhaseError::Spawn {
                program: program.clone(),
                source,
            })?;
            stages.push(StageStatus::from_exit(&program, status));
        }

        Ok(ExecReport {
            command,
            stages,
            skipped: false,
        })
    }
}

/// コマンドを表示するだけのランナー
#[derive(Debug, Default)]
pub struct DryRunRunner {
    pub commands: Vec<String>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IToolRunner for DryRunRunner {
    fn run(&mut self, pipeline: &Pipeline) -> Result<ExecReport> {
        let command = pipeline.to_string();
        info!("[dry-run] {}", command);
        println!("{}", command);
        self.commands.push(command.clone());
        Ok(ExecReport {
            command,
            stages: Vec::new(),
            skipped: true,
        })
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

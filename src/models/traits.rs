use crate::error::Result;
use crate::process::{ExecReport, Pipeline};

/// 外部ツールのパイプラインを実行するインターフェース
pub trait IToolRunner {
    /// パイプラインを実行し、各段の終了状態を返す
    ///
    /// 起動自体に失敗した場合のみ `Err` を返します。
    /// 終了コードの判定は呼び出し側で行います。
    fn run(&mut self, pipeline: &Pipeline) -> Result<ExecReport>;

    /// ファイルシステムを変更しないモードかどうか
    fn is_dry_run(&self) -> bool {
        false
    }
}

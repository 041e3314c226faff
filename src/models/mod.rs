// 計算モードやパラメータなどの基本データ型
pub mod common;

// 外部ツール実行のインターフェース（trait）定義
pub mod traits;

// 出力ディレクトリと各段階のコマンド組み立て
pub mod layout;
pub mod sky;
pub mod daylight;

// 便利な re-export
pub use common::*;
pub use traits::*;
pub use layout::OutputLayout;
pub use sky::{ClimatePreparation, ClimateSource};
pub use daylight::{PointFile, PointJob};

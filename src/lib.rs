//! sish ライブラリ — ベンチマーク・テスト用にモジュールを公開する。
//!
//! バイナリ本体は `main.rs` の REPL ループ。
//! この `lib.rs` は `benches/bench_main.rs` 等の外部クレートから
//! トークナイザ・ジョブテーブル・起動処理に直接アクセスするために存在する。
//!
//! ## モジュール構成
//!
//! | モジュール | 役割 |
//! |-----------|------|
//! | [`config`] | 起動時設定（`$MY_PROMPT`、履歴ファイル、`-v`） |
//! | [`editor`] | 行エディタ（`rustyline`） |
//! | [`history`] | コマンド履歴（`~/.sish_history` 永続化、`history` ビルトイン用） |
//! | [`parser`] | トークナイザ（トリム、空白区切り、行末 `&`、ビルトイン判定） |
//! | [`executor`] | 1 行の評価（ビルトイン or 起動、毎周のジョブポーリング） |
//! | [`builtins`] | ビルトイン（`exit`, `cd`, `jobs`, `history`） |
//! | [`spawn`] | 外部コマンド起動（fork、プロセスグループ、端末受け渡し、exec） |
//! | [`job`] | バックグラウンドジョブテーブル（非ブロッキング回収と通知） |
//! | [`shell`] | セッション（端末取得、シグナル設定）とループ状態 |

pub mod builtins;
pub mod config;
pub mod editor;
pub mod executor;
pub mod history;
pub mod job;
pub mod parser;
pub mod shell;
pub mod spawn;

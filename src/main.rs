//! sish — ジョブ制御付きのシンプルな対話シェル
//!
//! REPLループ: プロンプト表示 → 行エディタで入力読み取り → 履歴に記録 → 評価 → ループ
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

use std::io;
use std::process::ExitCode;

use sish::config::{self, Config, StartupAction};
use sish::editor::LineEditor;
use sish::executor;
use sish::history::History;
use sish::shell::{Session, Shell};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match config::parse_args(std::env::args().skip(1)) {
        StartupAction::Run => {}
        StartupAction::PrintVersion => {
            println!("{}", config::version_string());
            return ExitCode::SUCCESS;
        }
        StartupAction::Usage(opt) => {
            eprintln!("sish: unknown option: {}", opt);
            eprintln!("usage: sish [-v]");
            return ExitCode::from(2);
        }
    }

    let config = Config::from_env();
    let session = match Session::init(config.prompt.clone()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("sish: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut editor = match LineEditor::new() {
        Ok(ed) => ed,
        Err(e) => {
            eprintln!("sish: couldn't initialize line editor: {}", e);
            session.teardown();
            return ExitCode::FAILURE;
        }
    };

    let history = History::open(config.history_path.clone(), config.history_max);
    for entry in history.entries() {
        editor.add_history(entry);
    }
    let mut shell = Shell::new(history, session.terminal());

    let stdout = io::stdout();
    loop {
        let line = match editor.read_line(session.prompt()) {
            Ok(Some(line)) => line,
            Ok(None) => {
                // EOF (Ctrl+D): 改行を出力して正常終了
                println!();
                break;
            }
            Err(e) => {
                eprintln!("sish: {}", e);
                break;
            }
        };

        if !line.trim().is_empty() {
            editor.add_history(&line);
            shell.history.add(&line);
        }

        if let Err(e) = executor::execute(&mut shell, &line, &mut stdout.lock()) {
            log::warn!("couldn't write to stdout: {}", e);
        }

        if shell.should_exit {
            break;
        }
    }

    shell.jobs.destroy();
    session.teardown();
    ExitCode::SUCCESS
}

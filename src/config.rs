//! 起動時設定。環境変数とコマンドライン引数から読み込む。
//!
//! | 項目 | 取得元 | フォールバック |
//! |------|--------|----------------|
//! | プロンプト | `$MY_PROMPT` | `"shell>"` |
//! | 履歴ファイル | `$HOME/.sish_history` | `/tmp/.sish_history` |
//! | 履歴の最大件数 | 固定 | 1000 |

use std::env;
use std::path::PathBuf;

/// プロンプトを読み込む環境変数名。
pub const PROMPT_ENV_VARIABLE: &str = "MY_PROMPT";
/// ホームディレクトリの環境変数名。`cd` 引数省略時にも使う。
pub const HOME_ENV_VARIABLE: &str = "HOME";
/// `$MY_PROMPT` 未設定時のプロンプト。
pub const DEFAULT_PROMPT: &str = "shell>";

const HISTORY_FILE_NAME: &str = ".sish_history";
const HISTORY_MAX: usize = 1000;

/// シェル起動時に一度だけ解決される設定値。
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub prompt: String,
    pub history_path: PathBuf,
    pub history_max: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let prompt = resolve_prompt(env::var(PROMPT_ENV_VARIABLE).ok());
        let history_path = env::var(HOME_ENV_VARIABLE)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
            .join(HISTORY_FILE_NAME);
        Self {
            prompt,
            history_path,
            history_max: HISTORY_MAX,
        }
    }
}

/// 環境変数の値からプロンプト文字列を決める。未設定なら [`DEFAULT_PROMPT`]。
pub fn resolve_prompt(value: Option<String>) -> String {
    value.unwrap_or_else(|| DEFAULT_PROMPT.to_string())
}

// ── コマンドライン引数 ──────────────────────────────────────────────

/// 起動オプションの解析結果。
#[derive(Debug, PartialEq)]
pub enum StartupAction {
    /// 通常どおり REPL を開始する。
    Run,
    /// `-v`: バージョンを表示して終了する。
    PrintVersion,
    /// 不明なオプション。引数は問題のオプション文字列。
    Usage(String),
}

/// `argv[1..]` を解析する。認識するのは `-v` のみ。
pub fn parse_args<I, S>(args: I) -> StartupAction
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for arg in args {
        match arg.as_ref() {
            "-v" => return StartupAction::PrintVersion,
            other if other.starts_with('-') => return StartupAction::Usage(other.to_string()),
            _ => {}
        }
    }
    StartupAction::Run
}

/// `Simple Shell version MAJOR.MINOR` 形式のバージョン文字列。
pub fn version_string() -> String {
    format!(
        "Simple Shell version {}.{}",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_falls_back_to_default() {
        assert_eq!(resolve_prompt(None), "shell>");
        assert_eq!(resolve_prompt(Some("foo$ ".into())), "foo$ ");
    }

    #[test]
    fn version_flag() {
        assert_eq!(parse_args(["-v"]), StartupAction::PrintVersion);
        assert_eq!(parse_args(Vec::<String>::new()), StartupAction::Run);
        assert_eq!(parse_args(["-x"]), StartupAction::Usage("-x".into()));
    }

    #[test]
    fn version_string_format() {
        assert_eq!(version_string(), "Simple Shell version 1.0");
    }
}

//! トークナイザ: 入力行を引数ベクタ ([`Command`]) に変換する。
//!
//! クォート・変数展開・リダイレクトは扱わず、空白区切りの単純な分割のみ行う。
//!
//! ## メモリ構成
//!
//! [`Command`] はトリム済み行のコピーを 1 つのバッファとして所有し、各引数は
//! そのバッファ内のバイト範囲として保持する。引数ごとの確保は行わず、
//! `Command` の drop でバッファと範囲リストがちょうど 1 回ずつ解放される。
//!
//! ## 行末 `&`
//!
//! トリム後の最後の文字が `&` の場合のみバックグラウンド実行とみなす
//! （`echo a&b` は対象外）。判定は [`parse_line`] が行う。

use std::fmt;
use std::ops::Range;

/// バックグラウンド実行を示す行末文字。
pub const BACKGROUND_CHAR: char = '&';

/// `sysconf` が値を返さなかった場合の引数数上限。
const FALLBACK_MAX_ARGS: usize = 4096;

// ── trim ────────────────────────────────────────────────────────────

/// 先頭と末尾の空白をその場で取り除く。
///
/// 空白のみの文字列は空文字列になる。既にトリム済みの文字列（1 文字を含む）は変更しない。
pub fn trim_white(line: &mut String) {
    let end = line.trim_end().len();
    line.truncate(end);
    let start = line.len() - line.trim_start().len();
    if start > 0 {
        line.drain(..start);
    }
}

// ── Builtin ─────────────────────────────────────────────────────────

/// シェル内部で実行するコマンド。パース時に一度だけ判定される。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// `exit` — REPL ループを終了する。
    Exit,
    /// `cd [dir]` — カレントディレクトリを変更する。
    Cd,
    /// `jobs` — 全バックグラウンドジョブを報告し、完了分を削除する。
    Jobs,
    /// `history` — 入力履歴を古い順に表示する。
    History,
}

impl Builtin {
    /// コマンド名からビルトインを引く。該当しなければ `None`（外部コマンド）。
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "exit" => Some(Self::Exit),
            "cd" => Some(Self::Cd),
            "jobs" => Some(Self::Jobs),
            "history" => Some(Self::History),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Exit => "exit",
            Self::Cd => "cd",
            Self::Jobs => "jobs",
            Self::History => "history",
        }
    }
}

// ── Command ─────────────────────────────────────────────────────────

/// 空白区切りの引数列。単一バッファ + バイト範囲リストで構成される。
///
/// `args()` が尽きた位置（`arg(len())` が `None`）が引数列の終端を表す。
/// exec 用の NULL 終端ポインタ配列は [`spawn`](crate::spawn) が構築する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    buf: Box<str>,
    spans: Vec<Range<usize>>,
    builtin: Option<Builtin>,
}

impl Command {
    /// 行をトークン化する。上限はプラットフォームの `_SC_ARG_MAX`。
    pub fn parse(line: &str) -> Self {
        Self::parse_with_limit(line, max_args())
    }

    /// 引数数の上限を指定してトークン化する。上限を超えたトークンは黙って捨てる。
    pub fn parse_with_limit(line: &str, max_args: usize) -> Self {
        let buf: Box<str> = line.trim().into();
        let mut spans = Vec::new();
        let mut start: Option<usize> = None;
        let mut truncated = false;

        for (i, c) in buf.char_indices() {
            match (c.is_whitespace(), start) {
                (true, Some(s)) => {
                    if spans.len() < max_args {
                        spans.push(s..i);
                    } else {
                        truncated = true;
                    }
                    start = None;
                }
                (false, None) => start = Some(i),
                _ => {}
            }
        }
        if let Some(s) = start {
            if spans.len() < max_args {
                spans.push(s..buf.len());
            } else {
                truncated = true;
            }
        }

        if truncated {
            log::warn!("argument list truncated to {} entries", max_args);
        }

        let builtin = spans.first().and_then(|r| Builtin::from_name(&buf[r.clone()]));
        Self {
            buf,
            spans,
            builtin,
        }
    }

    /// 引数の数（終端は含まない）。
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// `i` 番目の引数。範囲外なら `None`。
    pub fn arg(&self, i: usize) -> Option<&str> {
        self.spans.get(i).map(|r| &self.buf[r.clone()])
    }

    /// コマンド名（`argv[0]`）。
    pub fn program(&self) -> Option<&str> {
        self.arg(0)
    }

    /// 全引数のイテレータ。
    pub fn args(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.spans.iter().map(move |r| &self.buf[r.clone()])
    }

    /// パース時に判定したビルトイン種別。
    pub fn builtin(&self) -> Option<Builtin> {
        self.builtin
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(arg)?;
        }
        Ok(())
    }
}

/// `sysconf(_SC_ARG_MAX)` を引数数の上限として返す。
fn max_args() -> usize {
    let n = unsafe { libc::sysconf(libc::_SC_ARG_MAX) };
    if n > 0 {
        n as usize
    } else {
        FALLBACK_MAX_ARGS
    }
}

// ── 行の解析 ────────────────────────────────────────────────────────

/// 1 行分の解析結果。
#[derive(Debug, PartialEq)]
pub struct Line {
    pub command: Command,
    /// 行末に `&` があった場合に `true`。
    pub background: bool,
}

/// 入力行をトリムし、行末 `&` を判定してからトークン化する。
///
/// 空行、または `&` のみの行は `None`。
pub fn parse_line(raw: &str) -> Option<Line> {
    let mut line = raw.to_string();
    trim_white(&mut line);

    let background = line.ends_with(BACKGROUND_CHAR);
    if background {
        line.pop();
    }

    let command = Command::parse(&line);
    if command.is_empty() {
        return None;
    }
    Some(Line {
        command,
        background,
    })
}

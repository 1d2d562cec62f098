//! 外部コマンドの起動: `fork` → 子の環境設定 → `execvp`。
//!
//! ## 手順
//!
//! | 段階 | 実行場所 | 内容 |
//! |------|----------|------|
//! | spawn | 親 | `fork`。失敗時は [`LaunchError::Fork`] を返し、ジョブは登録しない |
//! | 環境設定 | 子 | [`ChildSetup`] を適用: 新しいプロセスグループ、フォアグラウンドなら端末の受け渡しとシグナルの `SIG_DFL` 復元 |
//! | exec | 子 | `execvp`。失敗したらコマンド名付きで stderr に報告して `_exit` |
//!
//! [`ChildSetup::plan`] は (フォアグラウンドか, プロセスグループ, 端末) だけから決まる純粋関数で、
//! fork せずにテストできる。
//!
//! 親側: フォアグラウンドなら子の終了を待って端末を取り戻し、
//! バックグラウンドなら [`JobTable`] に登録して即座に返る。

use std::ffi::CString;
use std::io::{self, Write};
use std::os::unix::io::RawFd;

use libc::{c_int, pid_t};

use crate::job::JobTable;
use crate::parser::Command;
use crate::shell::{self, Terminal, JOB_CONTROL_SIGNALS};

// ── エラー型 ──────────────────────────────────────────────────────

/// 親側から観測できる起動失敗。exec の失敗は子の中でしか分からないため含まない。
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("fork: {0}")]
    Fork(#[source] io::Error),
    #[error("{0}: argument contains a NUL byte")]
    NulByte(String),
    #[error("empty command")]
    Empty,
}

/// 起動結果。
#[derive(Debug, PartialEq)]
pub enum Launched {
    /// フォアグラウンドの子が終了した。`status` は終了コード（128 + シグナル番号を含む）。
    /// 自動回収で取得できなかった場合は `None`。
    Foreground { pid: pid_t, status: Option<i32> },
    /// バックグラウンドジョブとして登録した。
    Background { pid: pid_t, number: usize },
}

// ── ChildSetup ──────────────────────────────────────────────────────

/// fork 後の子プロセスで exec 前に行う設定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSetup {
    /// `setpgid(0, pgid)` に渡す値。0 なら子の PID がグループリーダーになる。
    pub pgid: pid_t,
    /// フォアグラウンドを渡す端末。バックグラウンドや非対話モードでは `None`。
    pub terminal: Option<RawFd>,
    /// `SIG_DFL` に戻すシグナル。
    pub reset_signals: &'static [c_int],
}

impl ChildSetup {
    pub fn plan(foreground: bool, pgid: pid_t, terminal: Option<RawFd>) -> Self {
        if foreground {
            Self {
                pgid,
                terminal,
                reset_signals: &JOB_CONTROL_SIGNALS,
            }
        } else {
            Self {
                pgid,
                terminal: None,
                reset_signals: &[],
            }
        }
    }

    /// 子プロセス内で設定を適用する。失敗しても exec は続行する。
    fn apply(&self) {
        unsafe {
            libc::setpgid(0, self.pgid);
            if let Some(fd) = self.terminal {
                libc::tcsetpgrp(fd, libc::getpgrp());
            }
        }
        shell::set_dispositions(self.reset_signals, libc::SIG_DFL);
    }
}

// ── Argv ────────────────────────────────────────────────────────────

/// `execvp` 用の NULL 終端ポインタ配列。fork 前に構築しておく。
struct Argv {
    _strings: Vec<CString>,
    ptrs: Vec<*const libc::c_char>,
}

impl Argv {
    fn new(command: &Command) -> Result<Self, LaunchError> {
        let strings = command
            .args()
            .map(CString::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| LaunchError::NulByte(command.program().unwrap_or_default().to_string()))?;
        if strings.is_empty() {
            return Err(LaunchError::Empty);
        }
        let mut ptrs: Vec<*const libc::c_char> = strings.iter().map(|s| s.as_ptr()).collect();
        ptrs.push(std::ptr::null()); // NULL 終端
        Ok(Self {
            _strings: strings,
            ptrs,
        })
    }

    fn program(&self) -> *const libc::c_char {
        self.ptrs[0]
    }

    fn as_ptr(&self) -> *const *const libc::c_char {
        self.ptrs.as_ptr()
    }
}

// ── launch ──────────────────────────────────────────────────────────

/// コマンドを外部プログラムとして起動する。
///
/// - `background == false`: 子の終了までブロックし、端末をシェルに戻してから返る。
///   `command` はここで解放される。
/// - `background == true`: `command` の所有権を `jobs` に移して即座に返る。
///
/// `terminal` は対話モードのときのみ `Some`。
pub fn launch(
    command: Command,
    background: bool,
    terminal: Option<Terminal>,
    jobs: &mut JobTable,
) -> Result<Launched, LaunchError> {
    let argv = Argv::new(&command)?;
    let setup = ChildSetup::plan(!background, 0, terminal.map(|t| t.fd));

    // fork 前に未出力のバッファを吐き出す（子で二重出力しないため）
    let _ = io::stdout().flush();

    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(LaunchError::Fork(io::Error::last_os_error()));
    }
    if pid == 0 {
        exec_child(&argv, &setup, command.program().unwrap_or_default());
    }

    // 親側でもプロセスグループを設定（レースコンディション防止）。
    // 子が既に exec 済みなら EACCES になるが問題ない。
    unsafe {
        libc::setpgid(pid, pid);
    }
    log::debug!("spawned pid {} ({}): {}", pid, if background { "bg" } else { "fg" }, command);

    if background {
        let number = jobs.add(command, pid);
        return Ok(Launched::Background { pid, number });
    }

    if let Some(t) = terminal {
        let _ = t.give_to(pid);
    }
    let status = wait_foreground(pid);
    if let Some(t) = terminal {
        if let Err(e) = t.take_back() {
            log::warn!("couldn't reclaim the terminal: {}", e);
        }
    }
    Ok(Launched::Foreground { pid, status })
}

/// 子プロセス側。戻らない。
fn exec_child(argv: &Argv, setup: &ChildSetup, name: &str) -> ! {
    setup.apply();
    unsafe {
        libc::execvp(argv.program(), argv.as_ptr());
    }

    let err = io::Error::last_os_error();
    let code = match err.raw_os_error() {
        Some(libc::EACCES) | Some(libc::ENOEXEC) => 126,
        _ => 127,
    };
    // ロックを取らないよう write(2) で直接書く
    let msg = format!("sish: {}: {}\n", name, err);
    unsafe {
        libc::write(
            libc::STDERR_FILENO,
            msg.as_ptr() as *const libc::c_void,
            msg.len(),
        );
        libc::_exit(code)
    }
}

/// フォアグラウンドの子 `pid` の終了までブロックする。
///
/// `SIGCHLD` 無視中はカーネルが自動回収するため、`ECHILD` で終了ステータスなしに戻る。
fn wait_foreground(pid: pid_t) -> Option<i32> {
    loop {
        let mut raw_status: i32 = 0;
        let ret = unsafe { libc::waitpid(pid, &mut raw_status, 0) };
        if ret == pid {
            return Some(exit_code(raw_status));
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        log::debug!("waitpid({}) returned without status: {}", pid, err);
        return None;
    }
}

/// `waitpid` の raw status を終了コードに変換する。シグナル終了は 128 + シグナル番号。
pub fn exit_code(raw_status: i32) -> i32 {
    if libc::WIFEXITED(raw_status) {
        libc::WEXITSTATUS(raw_status)
    } else if libc::WIFSIGNALED(raw_status) {
        128 + libc::WTERMSIG(raw_status)
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreground_plan_takes_terminal_and_resets_signals() {
        let setup = ChildSetup::plan(true, 0, Some(0));
        assert_eq!(setup.pgid, 0);
        assert_eq!(setup.terminal, Some(0));
        assert_eq!(setup.reset_signals, &JOB_CONTROL_SIGNALS[..]);
    }

    #[test]
    fn background_plan_never_takes_terminal() {
        let setup = ChildSetup::plan(false, 0, Some(0));
        assert_eq!(setup.terminal, None);
        assert!(setup.reset_signals.is_empty());
    }

    #[test]
    fn non_interactive_foreground_plan() {
        let setup = ChildSetup::plan(true, 0, None);
        assert_eq!(setup.terminal, None);
        assert_eq!(setup.reset_signals.len(), 5);
    }

    #[test]
    fn argv_rejects_nul_and_empty() {
        let cmd = Command::parse("");
        assert!(matches!(Argv::new(&cmd), Err(LaunchError::Empty)));

        let cmd = Command::parse("echo a\0b");
        assert!(matches!(Argv::new(&cmd), Err(LaunchError::NulByte(p)) if p == "echo"));
    }

    #[test]
    fn argv_is_null_terminated() {
        let argv = Argv::new(&Command::parse("ls -a -l")).unwrap();
        assert_eq!(argv.ptrs.len(), 4);
        assert!(argv.ptrs[3].is_null());
    }

    #[test]
    fn exit_code_conversion() {
        // Linux の wait status エンコーディング
        assert_eq!(exit_code(0), 0);
        assert_eq!(exit_code(3 << 8), 3);
        assert_eq!(exit_code(libc::SIGKILL), 128 + libc::SIGKILL);
    }

    #[test]
    fn foreground_launch_reports_exit_status() {
        let mut jobs = JobTable::new();

        let r = launch(Command::parse("true"), false, None, &mut jobs).unwrap();
        assert!(matches!(r, Launched::Foreground { status: Some(0), .. }));

        let r = launch(Command::parse("false"), false, None, &mut jobs).unwrap();
        assert!(matches!(r, Launched::Foreground { status: Some(1), .. }));

        let r = launch(Command::parse("sish-no-such-command-xyz"), false, None, &mut jobs).unwrap();
        assert!(matches!(r, Launched::Foreground { status: Some(127), .. }));

        assert!(jobs.is_empty());
    }

    #[test]
    fn background_launch_records_job() {
        let mut jobs = JobTable::new();
        let r = launch(Command::parse("true"), true, None, &mut jobs).unwrap();
        let pid = match r {
            Launched::Background { pid, number } => {
                assert_eq!(number, 1);
                pid
            }
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs.iter().next().unwrap().command.to_string(), "true");

        // 終了を待ってからポーリングすると done が 1 回だけ出る
        let mut raw = 0;
        unsafe { libc::waitpid(pid, &mut raw, 0) };
        let mut out = Vec::new();
        jobs.poll(false, &mut crate::job::WaitPid, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[1] done true &\n");
        assert!(jobs.is_empty());
    }
}

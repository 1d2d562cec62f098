//! バックグラウンドジョブテーブル。
//!
//! [`JobTable::add`] で登録、[`JobTable::poll`] で非ブロッキングに完了を検出して通知・削除、
//! [`JobTable::destroy`] でセッション終了時に残りを解放する。
//!
//! ## ジョブ番号
//!
//! 1 から始まり、テーブルの生存期間中は単調増加する。削除済みの番号は再利用しない
//! （テーブルが空になった後も続きの番号を割り当てる）。
//!
//! ## 状態確認
//!
//! プロセスの状態確認は [`StatusProbe`] トレイト経由で行う。本番は [`WaitPid`]
//! （`waitpid(pid, WNOHANG)`）、テストではスクリプト化したプローブを差し込む。

use std::io::{self, Write};

use libc::pid_t;

use crate::parser::{Command, BACKGROUND_CHAR};

// ── 状態確認 ─────────────────────────────────────────────────────────

/// 非ブロッキング状態確認の結果。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProcessState {
    /// まだ実行中。
    Running,
    /// 終了を回収した。引数は `waitpid` の raw status。
    Exited(i32),
    /// 既に回収済み、または `waitpid` が失敗した。完了と同じく削除する。
    Gone,
}

/// プロセスの状態を 1 回だけ確認する。ブロックしてはならない。
pub trait StatusProbe {
    fn probe(&mut self, pid: pid_t) -> ProcessState;
}

/// `waitpid(pid, WNOHANG)` によるプローブ。
///
/// `EINTR` は再試行する。`ECHILD`（`SIGCHLD` 無視による自動回収など）は
/// [`ProcessState::Gone`]。それ以外のエラーも `Gone` として扱い、warn ログを出す。
pub struct WaitPid;

impl StatusProbe for WaitPid {
    fn probe(&mut self, pid: pid_t) -> ProcessState {
        loop {
            let mut raw_status: i32 = 0;
            let ret = unsafe { libc::waitpid(pid, &mut raw_status, libc::WNOHANG) };
            if ret == 0 {
                return ProcessState::Running;
            }
            if ret > 0 {
                return ProcessState::Exited(raw_status);
            }

            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ECHILD) => return ProcessState::Gone,
                _ => {
                    log::warn!("waitpid({}) failed: {}", pid, err);
                    return ProcessState::Gone;
                }
            }
        }
    }
}

// ── Job ──────────────────────────────────────────────────────────────

/// バックグラウンドジョブ 1 件。コマンドを所有し、削除時に一緒に解放される。
#[derive(Debug)]
pub struct Job {
    /// `[N]` 形式で表示されるジョブ番号。
    pub number: usize,
    pub pid: pid_t,
    pub command: Command,
}

// ── JobTable ─────────────────────────────────────────────────────────

/// ジョブテーブル。登録順を保持する。
///
/// REPL ループが所有し、ビルトインと起動処理に `&mut` で渡される。
pub struct JobTable {
    jobs: Vec<Job>,
    next_number: usize,
}

impl JobTable {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            next_number: 1,
        }
    }

    /// ジョブを末尾に追加し、割り当てた番号を返す。
    ///
    /// 同じ PID のジョブが残っている場合（自動回収後の PID 再利用）は古い方を捨てる。
    pub fn add(&mut self, command: Command, pid: pid_t) -> usize {
        if let Some(pos) = self.jobs.iter().position(|j| j.pid == pid) {
            let stale = self.jobs.remove(pos);
            log::warn!("dropping stale job [{}] with reused pid {}", stale.number, pid);
        }

        let number = self.next_number;
        self.next_number += 1;
        log::debug!("job [{}] pid {} added: {}", number, pid, command);
        self.jobs.push(Job {
            number,
            pid,
            command,
        });
        number
    }

    /// 全ジョブを登録順に 1 回ずつ確認する。
    ///
    /// - 終了（または確認失敗）: `[N] done <cmd> &` を出力してテーブルから削除
    /// - 実行中: `report_all` なら `[N] <pid> running <cmd> &` を出力して残す
    ///
    /// 出力エラーが起きても確認と削除は最後まで行い、最初のエラーを返す。
    pub fn poll<P, W>(&mut self, report_all: bool, probe: &mut P, out: &mut W) -> io::Result<()>
    where
        P: StatusProbe + ?Sized,
        W: Write + ?Sized,
    {
        let mut result = Ok(());
        self.jobs.retain(|job| {
            let state = probe.probe(job.pid);
            let keep = state == ProcessState::Running;
            let written = if !keep {
                log::debug!("job [{}] pid {} reaped: {:?}", job.number, job.pid, state);
                writeln!(out, "[{}] done {} {}", job.number, job.command, BACKGROUND_CHAR)
            } else if report_all {
                writeln!(
                    out,
                    "[{}] {} running {} {}",
                    job.number, job.pid, job.command, BACKGROUND_CHAR
                )
            } else {
                Ok(())
            };
            if result.is_ok() {
                result = written;
            }
            keep
        });
        result
    }

    /// 残っている全ジョブを解放する。空のテーブルに対しては何もしない。
    pub fn destroy(&mut self) {
        if !self.jobs.is_empty() {
            log::debug!("releasing {} outstanding job(s)", self.jobs.len());
        }
        self.jobs.clear();
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// 全ジョブのイテレータ（登録順）。
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

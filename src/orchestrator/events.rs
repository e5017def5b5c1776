//! 워커 → 코디네이터 진행 이벤트
//!
//! 워커는 화면 상태를 직접 건드리지 않고, 이 채널로만 진행 상황을 보냅니다.

use hsm_updater_lib::TransferProgress;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::OperationOutcome;

pub type EventSender = mpsc::UnboundedSender<PipelineEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<PipelineEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// 작업 시작
    Started { op: Uuid, label: String },
    /// 파이프라인 단계 전환 (다운로드 → 압축 해제 → 복구 ...)
    Step { op: Uuid, message: String },
    /// `percent`가 None이면 전체 크기를 모르는 진행
    Progress {
        op: Uuid,
        percent: Option<u8>,
        message: String,
    },
    /// 마지막 이벤트. 작업마다 정확히 한 번 전송된다.
    Finished { op: Uuid, outcome: OperationOutcome },
}

impl PipelineEvent {
    pub fn op(&self) -> Uuid {
        match self {
            PipelineEvent::Started { op, .. }
            | PipelineEvent::Step { op, .. }
            | PipelineEvent::Progress { op, .. }
            | PipelineEvent::Finished { op, .. } => *op,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, PipelineEvent::Finished { .. })
    }
}

/// 작업 하나에 묶인 이벤트 송신기
#[derive(Clone)]
pub struct Reporter {
    op: Uuid,
    tx: EventSender,
}

impl Reporter {
    pub fn new(tx: EventSender) -> Self {
        Self {
            op: Uuid::new_v4(),
            tx,
        }
    }

    pub fn op(&self) -> Uuid {
        self.op
    }

    fn send(&self, event: PipelineEvent) {
        // 수신 측이 먼저 종료된 경우는 무시
        let _ = self.tx.send(event);
    }

    pub fn started(&self, label: impl Into<String>) {
        self.send(PipelineEvent::Started {
            op: self.op,
            label: label.into(),
        });
    }

    pub fn step(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("[Installer] {}", message);
        self.send(PipelineEvent::Step { op: self.op, message });
    }

    pub fn progress(&self, progress: &TransferProgress) {
        self.send(PipelineEvent::Progress {
            op: self.op,
            percent: progress.percent(),
            message: progress.label.clone(),
        });
    }

    pub fn finish(&self, outcome: OperationOutcome) {
        self.send(PipelineEvent::Finished { op: self.op, outcome });
    }

    /// Fetcher/Extractor에 넘길 진행 콜백. 같은 퍼센트는 한 번만 전달한다.
    pub fn progress_sink(&self) -> impl FnMut(TransferProgress) + Send + 'static {
        let reporter = self.clone();
        let mut last: Option<u8> = None;
        move |progress: TransferProgress| {
            let percent = progress.percent();
            if percent.is_some() && percent == last {
                return;
            }
            last = percent;
            reporter.progress(&progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_drops_repeated_percentages() {
        let (tx, mut rx) = channel();
        let reporter = Reporter::new(tx);
        let mut sink = reporter.progress_sink();

        sink(TransferProgress::download(10, Some(1000)));
        sink(TransferProgress::download(11, Some(1000)));
        sink(TransferProgress::download(500, Some(1000)));
        sink(TransferProgress::download(1000, Some(1000)));

        let mut percents = Vec::new();
        while let Ok(PipelineEvent::Progress { percent, .. }) = rx.try_recv() {
            percents.push(percent);
        }
        assert_eq!(percents, [Some(1), Some(50), Some(100)]);
    }

    #[test]
    fn events_carry_operation_id() {
        let (tx, mut rx) = channel();
        let reporter = Reporter::new(tx);
        reporter.started("Install Halo CE");
        reporter.finish(OperationOutcome::ok("done"));

        let first = rx.try_recv().unwrap();
        let last = rx.try_recv().unwrap();
        assert_eq!(first.op(), reporter.op());
        assert_eq!(last.op(), reporter.op());
        assert!(last.is_finished());
    }

    #[test]
    fn closed_receiver_is_ignored() {
        let (tx, rx) = channel();
        drop(rx);
        Reporter::new(tx).step("nobody listening");
    }
}

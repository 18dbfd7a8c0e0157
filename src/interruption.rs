//! C8: reacts to focus/route/phone-call events and drives synthetic
//! pause/resume commands into the façade's command queue (§4.8). Pure
//! policy table plus the duration-accounting union-not-sum rule.

use std::time::Instant;

/// External interruption events the host platform reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionEvent {
    FocusGain,
    FocusLossPermanent,
    FocusLossTransient,
    FocusLossDuck,
    RouteChangeHeadphoneDisconnect,
    RouteChangeOther,
    PhoneCallBegin,
    PhoneCallEnd,
}

/// What the coordinator tells the façade to do in response to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorAction {
    PauseCapture,
    ResumeCaptureIfAutoPaused,
    None,
}

impl InterruptionEvent {
    /// §4.8 policy table, "Effect on capture" column.
    pub fn capture_action(self) -> CoordinatorAction {
        match self {
            InterruptionEvent::PhoneCallBegin => CoordinatorAction::PauseCapture,
            InterruptionEvent::PhoneCallEnd => CoordinatorAction::ResumeCaptureIfAutoPaused,
            InterruptionEvent::FocusLossPermanent => CoordinatorAction::None,
            InterruptionEvent::FocusLossTransient => CoordinatorAction::None,
            InterruptionEvent::FocusLossDuck => CoordinatorAction::None,
            InterruptionEvent::FocusGain => CoordinatorAction::None,
            InterruptionEvent::RouteChangeHeadphoneDisconnect => CoordinatorAction::PauseCapture,
            InterruptionEvent::RouteChangeOther => CoordinatorAction::None,
        }
    }

    /// §4.8 policy table, "Effect on duration accounting" column.
    pub fn accounting_effect(self) -> AccountingEffect {
        match self {
            InterruptionEvent::PhoneCallBegin => AccountingEffect::Pause,
            InterruptionEvent::PhoneCallEnd => AccountingEffect::Resume,
            InterruptionEvent::FocusLossPermanent => AccountingEffect::Pause,
            InterruptionEvent::FocusLossTransient => AccountingEffect::Pause,
            InterruptionEvent::FocusLossDuck => AccountingEffect::Pause,
            InterruptionEvent::FocusGain => AccountingEffect::Resume,
            InterruptionEvent::RouteChangeHeadphoneDisconnect => AccountingEffect::Pause,
            InterruptionEvent::RouteChangeOther => AccountingEffect::Unchanged,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountingEffect {
    Pause,
    Resume,
    Unchanged,
}

/// Tracks the union (not sum) of concurrently active manual and
/// interruption pauses, per §4.8's duration-accounting rule.
#[derive(Debug, Default)]
pub struct PauseAccounting {
    manual_pause_start: Option<Instant>,
    interrupt_pause_start: Option<Instant>,
    accumulated_manual: std::time::Duration,
    accumulated_interrupt: std::time::Duration,
}

impl PauseAccounting {
    pub fn begin_manual_pause(&mut self, now: Instant) {
        if self.manual_pause_start.is_none() {
            self.manual_pause_start = Some(now);
        }
    }

    pub fn end_manual_pause(&mut self, now: Instant) {
        if let Some(start) = self.manual_pause_start.take() {
            self.accumulated_manual += now.saturating_duration_since(start);
        }
    }

    pub fn begin_interrupt_pause(&mut self, now: Instant) {
        if self.interrupt_pause_start.is_none() {
            self.interrupt_pause_start = Some(now);
        }
    }

    pub fn end_interrupt_pause(&mut self, now: Instant) {
        if let Some(start) = self.interrupt_pause_start.take() {
            self.accumulated_interrupt += now.saturating_duration_since(start);
        }
    }

    pub fn reset(&mut self) {
        *self = PauseAccounting::default();
    }

    /// Total paused time to subtract from wall-clock elapsed. When manual
    /// and interrupt pauses overlap, counts the union of the interval, not
    /// their sum — realized here by taking the max of the two *active*
    /// pause durations-so-far rather than adding both, per §4.8.
    pub fn total_paused(&self, now: Instant) -> std::time::Duration {
        let manual_active = self
            .manual_pause_start
            .map(|s| now.saturating_duration_since(s))
            .unwrap_or_default();
        let interrupt_active = self
            .interrupt_pause_start
            .map(|s| now.saturating_duration_since(s))
            .unwrap_or_default();

        let active = if self.manual_pause_start.is_some() && self.interrupt_pause_start.is_some() {
            manual_active.max(interrupt_active)
        } else {
            manual_active + interrupt_active
        };

        self.accumulated_manual + self.accumulated_interrupt + active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn phone_call_begin_pauses_capture_and_accounting() {
        assert_eq!(
            InterruptionEvent::PhoneCallBegin.capture_action(),
            CoordinatorAction::PauseCapture
        );
        assert_eq!(
            InterruptionEvent::PhoneCallBegin.accounting_effect(),
            AccountingEffect::Pause
        );
    }

    #[test]
    fn focus_loss_permanent_keeps_recording_but_pauses_accounting() {
        assert_eq!(
            InterruptionEvent::FocusLossPermanent.capture_action(),
            CoordinatorAction::None
        );
        assert_eq!(
            InterruptionEvent::FocusLossPermanent.accounting_effect(),
            AccountingEffect::Pause
        );
    }

    #[test]
    fn route_change_other_is_fully_unchanged() {
        assert_eq!(
            InterruptionEvent::RouteChangeOther.capture_action(),
            CoordinatorAction::None
        );
        assert_eq!(
            InterruptionEvent::RouteChangeOther.accounting_effect(),
            AccountingEffect::Unchanged
        );
    }

    #[test]
    fn concurrent_manual_and_interrupt_pause_counts_once() {
        let mut acc = PauseAccounting::default();
        let t0 = Instant::now();
        acc.begin_manual_pause(t0);
        acc.begin_interrupt_pause(t0 + Duration::from_millis(10));

        let t1 = t0 + Duration::from_secs(5);
        let total = acc.total_paused(t1);
        // Union of two overlapping pauses of ~5s should be ~5s, not ~10s.
        assert!(total < Duration::from_secs(6));
        assert!(total >= Duration::from_secs(4));
    }

    /// spec.md §8 scenario 4: a phone call begins 12s into a 20s recording
    /// and lasts 5s; accounted duration at the 20s mark should reflect
    /// ~15s of actual recording, with the interrupt-pause union contributing
    /// ~5s, and a `phone_call_end` auto-resuming accounting.
    #[test]
    fn phone_call_interruption_accounts_for_paused_duration() {
        let mut acc = PauseAccounting::default();
        let t0 = Instant::now();

        let call_begin = t0 + Duration::from_secs(12);
        acc.begin_interrupt_pause(call_begin);
        let call_end = call_begin + Duration::from_secs(5);
        acc.end_interrupt_pause(call_end);

        let at_stop = t0 + Duration::from_secs(20);
        let elapsed = at_stop.saturating_duration_since(t0);
        let accounted = elapsed.saturating_sub(acc.total_paused(at_stop));

        assert!(
            (accounted.as_millis() as i64 - 15_000).abs() < 50,
            "accounted duration should be ~15s, was {accounted:?}"
        );
        assert_eq!(acc.total_paused(at_stop), Duration::from_secs(5));
    }

    #[test]
    fn sequential_pauses_accumulate() {
        let mut acc = PauseAccounting::default();
        let t0 = Instant::now();
        acc.begin_manual_pause(t0);
        acc.end_manual_pause(t0 + Duration::from_secs(2));
        acc.begin_interrupt_pause(t0 + Duration::from_secs(3));
        acc.end_interrupt_pause(t0 + Duration::from_secs(4));

        let total = acc.total_paused(t0 + Duration::from_secs(10));
        assert_eq!(total, Duration::from_secs(3));
    }
}

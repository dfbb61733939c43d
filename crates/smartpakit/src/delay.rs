use embedded_hal::delay::DelayNs as BlockingDelayNs;
use embedded_hal_async::delay::DelayNs as AsyncDelayNs;

/// A delay provider offering both a busy-wait and a yielding delay.
///
/// `embassy_time::Delay` implements both halves.
pub trait SequenceDelay: BlockingDelayNs + AsyncDelayNs {}

impl<T> SequenceDelay for T where T: BlockingDelayNs + AsyncDelayNs {}

/// Delay step of a hardware sequence.
///
/// Steps in the middle of a sequence busy-wait so the calling task cannot be
/// preempted between two timed hardware steps. The final step of a sequence
/// yields to the scheduler instead.
pub async fn sequenced_delay<D: SequenceDelay>(
    delay: &mut D,
    is_last: bool,
    ms: u32,
) {
    if is_last {
        AsyncDelayNs::delay_ms(delay, ms).await;
    } else {
        BlockingDelayNs::delay_ms(delay, ms);
    }
}

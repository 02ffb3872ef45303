/// Distinguishes a cold boot from a user-triggered soft reset.
///
/// Mappers that power on with different defaults than a reset leaves behind
/// (e.g. MMC1's shift register) consult this when [`crate::Nes::reset`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetKind {
    PowerOn,
    Soft,
}

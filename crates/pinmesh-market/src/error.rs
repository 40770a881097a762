use thiserror::Error;

/// Marketplace error types.
///
/// Every error is returned synchronously to the caller of the failing
/// operation and leaves the coordinator consistent: a failed operation
/// applies no state change, so retrying is always safe.
#[derive(Error, Debug, Clone)]
pub enum MarketError {
    // ========== Authorization ==========
    /// Caller is not in the admin set
    #[error("Not an admin: {0}")]
    NotAdmin(String),

    /// The initial admin is protected
    #[error("Cannot remove the initial admin")]
    CannotRemoveInitialAdmin,

    /// Admin already present in the set
    #[error("Admin already exists: {0}")]
    AdminExists(String),

    /// Admin not present in the set
    #[error("Admin not found: {0}")]
    AdminNotFound(String),

    /// Caller is not the slot's publisher
    #[error("Not the slot publisher: slot {slot_index} belongs to {publisher}")]
    NotSlotPublisher { slot_index: usize, publisher: String },

    // ========== Registration ==========
    /// Identity is already a registered pinner
    #[error("Already registered as pinner: {0}")]
    AlreadyRegistered(String),

    /// Identity is not a registered pinner
    #[error("Not a registered pinner: {0}")]
    NotRegistered(String),

    /// Pinner was deactivated by the reputation system
    #[error("Pinner inactive: {0}")]
    PinnerInactive(String),

    /// Duplicate (flagger, pinner) pair
    #[error("Already flagged: {flagger} against {pinner}")]
    AlreadyFlagged { flagger: String, pinner: String },

    /// A pinner cannot flag itself
    #[error("Cannot flag self")]
    CannotFlagSelf,

    // ========== Slot ==========
    /// Every slot index is active and unexpired
    #[error("No slots available")]
    NoSlotsAvailable,

    /// Index out of range or holds no active slot
    #[error("Invalid slot: {0}")]
    InvalidSlot(usize),

    /// Slot has outlived its epochs-to-live
    #[error("Slot expired: {0}")]
    SlotExpired(usize),

    /// Expiration predicate is false
    #[error("Slot not expired: {0}")]
    SlotNotExpired(usize),

    /// Pinner already appears in the slot's claim list
    #[error("Already claimed: {pinner} on slot {slot_index}")]
    AlreadyClaimed { slot_index: usize, pinner: String },

    /// An active, unexpired slot already holds this content digest
    #[error("Duplicate content: digest {0} already pinned")]
    DuplicateContent(String),

    // ========== Validation ==========
    /// Units outside [min_units, NUM_SLOTS]
    #[error("Quantity out of range: got {got}, allowed [{min}, {max}]")]
    QuantityOutOfRange { got: u32, min: u32, max: u32 },

    /// Offered price below the configured floor
    #[error("Price too low: got {got}, minimum {min}")]
    PriceTooLow { got: String, min: String },

    /// price * units overflows the token domain
    #[error("Amount overflow")]
    AmountOverflow,

    /// Empty or malformed content identifier
    #[error("Invalid content identifier: {0}")]
    InvalidContentId(String),

    /// Zero or otherwise unusable amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    // ========== Payment ==========
    /// Payer balance below the required amount
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: String, available: String },

    /// Underlying ledger failure
    #[error("Ledger error: {0}")]
    Ledger(String),
}

/// Result type for marketplace operations.
pub type Result<T> = std::result::Result<T, MarketError>;

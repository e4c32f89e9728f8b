// Container transaction engine.
//
// Keeps a shadow of the 36-slot carry inventory and of the currently open
// 27-slot container, fed by the session's content/slot/close events, and
// turns item transfers into the click sequences the server expects.
//
// Raw window slots map onto the shadows as follows:
//
// | window            | raw slots | shadow          |
// |-------------------|-----------|-----------------|
// | carry-only (id 0) | 9..45     | carry 0..36     |
// | container (id >0) | 0..27     | container 0..27 |
// | container (id >0) | 27..63    | carry 0..36     |

mod engine;
mod error;

pub use engine::{
    ContainerEngine, ContainerPhase, Count, Direction, CARRY_SLOTS, CONTAINER_SLOTS,
    HOTBAR_SLOTS, HOTBAR_START, MAX_STACK_SIZE,
};
pub use error::{InventoryError, SlotArea};

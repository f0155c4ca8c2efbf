use {
    crate::error::EngineError,
    serde::{Deserialize, Serialize},
};

/// Exported physical layout of a [`RingBuffer`]; enough to resume exactly where it left off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RingBufferState<T> {
    pub capacity: usize,
    pub items: Vec<Option<T>>,
    pub write_cursor: usize,
    pub filled: bool,
}

/// Fixed-capacity buffer that overwrites its oldest slot once full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    into = "RingBufferState<T>",
    try_from = "RingBufferState<T>",
    bound(
        serialize = "T: Serialize + Clone",
        deserialize = "T: Deserialize<'de>"
    )
)]
pub struct RingBuffer<T> {
    items: Vec<Option<T>>,
    write_cursor: usize,
    filled: bool,
}

impl<T> RingBuffer<T> {
    /// Capacity is clamped to at least one slot.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: std::iter::repeat_with(|| None).take(capacity).collect(),
            write_cursor: 0,
            filled: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.items.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        if self.filled {
            self.capacity()
        } else {
            self.write_cursor
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }

    /// Writes `item` at the cursor and returns whatever it overwrote.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = self.items[self.write_cursor].replace(item);
        self.write_cursor += 1;
        if self.write_cursor == self.capacity() {
            self.write_cursor = 0;
            self.filled = true;
        }
        evicted
    }

    /// The slot the next push will overwrite (the oldest item once full).
    pub fn peek(&self) -> Option<&T> {
        self.items[self.write_cursor].as_ref()
    }

    /// The most recently pushed item.
    pub fn reverse_peek(&self) -> Option<&T> {
        self.items[self.previous_cursor()].as_ref()
    }

    /// Items from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let capacity = self.capacity();
        (0..capacity).filter_map(move |offset| {
            self.items[(self.write_cursor + offset) % capacity].as_ref()
        })
    }

    /// Runs `f` against the buffer as if `item` had been pushed, then undoes the push.
    pub fn with_pushed<R>(&mut self, item: T, f: impl FnOnce(&Self) -> R) -> R {
        let was_filled = self.filled;
        let evicted = self.push(item);
        let result = f(self);
        self.write_cursor = self.previous_cursor();
        self.items[self.write_cursor] = evicted;
        self.filled = was_filled;
        result
    }

    fn previous_cursor(&self) -> usize {
        if self.write_cursor == 0 {
            self.capacity() - 1
        } else {
            self.write_cursor - 1
        }
    }
}

impl<T: Clone> RingBuffer<T> {
    pub fn export(&self) -> RingBufferState<T> {
        RingBufferState {
            capacity: self.capacity(),
            items: self.items.clone(),
            write_cursor: self.write_cursor,
            filled: self.filled,
        }
    }
}

impl<T> From<RingBuffer<T>> for RingBufferState<T> {
    fn from(buffer: RingBuffer<T>) -> Self {
        RingBufferState {
            capacity: buffer.capacity(),
            items: buffer.items,
            write_cursor: buffer.write_cursor,
            filled: buffer.filled,
        }
    }
}

impl<T> TryFrom<RingBufferState<T>> for RingBuffer<T> {
    type Error = EngineError;

    /// Rejects states whose layout could not have come from a real buffer.
    fn try_from(state: RingBufferState<T>) -> Result<Self, Self::Error> {
        let invalid = |why: &str| EngineError::InvalidState(format!("ring buffer {why}"));

        if state.capacity == 0 || state.items.len() != state.capacity {
            return Err(invalid("has mismatched capacity"));
        }
        if state.write_cursor >= state.capacity {
            return Err(invalid("has cursor out of bounds"));
        }
        // Slots can legitimately read back empty (NaN has no JSON form), but an
        // unfilled buffer never has anything at or past its cursor.
        if !state.filled && state.items[state.write_cursor..].iter().any(Option::is_some) {
            return Err(invalid("has items past its cursor"));
        }

        Ok(Self {
            items: state.items,
            write_cursor: state.write_cursor,
            filled: state.filled,
        })
    }
}

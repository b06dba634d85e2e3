//! Outbound input stream
//!
//! Input events are packed into a fixed buffer and flushed on the input tick.
//! Each record starts with a tag byte whose low nibble is the event kind and
//! whose high nibble carries the mouse button for button events. The server
//! composes `i16` fields high byte first, so they are written big-endian.

use crate::error::ViewerError;
use crate::network::error::NetworkResult;
use crate::network::protocol::OUTBOUND_BUFFER_SIZE;

pub const TAG_MOUSE_MOVE: u8 = 1;
pub const TAG_MOUSE_DOWN: u8 = 2;
pub const TAG_MOUSE_UP: u8 = 3;
pub const TAG_KEY_DOWN: u8 = 4;
pub const TAG_KEY_UP: u8 = 5;
pub const TAG_MOUSE_WHEEL: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    /// Extra buttons by their raw id (up to 15)
    Other(u8),
}

impl MouseButton {
    pub fn id(self) -> u8 {
        match self {
            MouseButton::Left => 0,
            MouseButton::Middle => 1,
            MouseButton::Right => 2,
            MouseButton::Other(id) => id & 0x0F,
        }
    }
}

/// A local input event to forward to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    MouseMove { x: i16, y: i16 },
    MouseDown(MouseButton),
    MouseUp(MouseButton),
    KeyDown { scancode: u8, char_code: i16 },
    KeyUp { scancode: u8 },
    MouseWheel { delta: i16 },
}

impl InputEvent {
    /// Encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        match self {
            InputEvent::MouseMove { .. } => 5,
            InputEvent::MouseDown(_) | InputEvent::MouseUp(_) => 1,
            InputEvent::KeyDown { .. } => 4,
            InputEvent::KeyUp { .. } => 2,
            InputEvent::MouseWheel { .. } => 3,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            InputEvent::MouseMove { .. } => TAG_MOUSE_MOVE,
            InputEvent::MouseDown(button) => (button.id() << 4) | TAG_MOUSE_DOWN,
            InputEvent::MouseUp(button) => (button.id() << 4) | TAG_MOUSE_UP,
            InputEvent::KeyDown { .. } => TAG_KEY_DOWN,
            InputEvent::KeyUp { .. } => TAG_KEY_UP,
            InputEvent::MouseWheel { .. } => TAG_MOUSE_WHEEL,
        }
    }
}

/// Append-only input buffer with a fixed capacity
#[derive(Debug)]
pub struct OutboundCommandQueue {
    buffer: Box<[u8]>,
    len: usize,
    flushed_messages: u64,
}

impl Default for OutboundCommandQueue {
    fn default() -> Self {
        Self::with_capacity(OUTBOUND_BUFFER_SIZE)
    }
}

impl OutboundCommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
            flushed_messages: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn flushed_messages(&self) -> u64 {
        self.flushed_messages
    }

    /// Append one event. A record that does not fit whole is rejected and
    /// nothing is written.
    pub fn push(&mut self, event: InputEvent) -> NetworkResult<()> {
        let needed = event.encoded_len();
        let remaining = self.capacity() - self.len;
        if needed > remaining {
            log::error!(
                "[OutboundCommandQueue::push] {:?} needs {} bytes, {} left",
                event,
                needed,
                remaining
            );
            return Err(ViewerError::OutboundOverflow {
                requested: needed,
                remaining,
                capacity: self.capacity(),
            });
        }

        self.write_u8(event.tag());
        match event {
            InputEvent::MouseMove { x, y } => {
                self.write_i16(x);
                self.write_i16(y);
            }
            InputEvent::MouseDown(_) | InputEvent::MouseUp(_) => {}
            InputEvent::KeyDown { scancode, char_code } => {
                self.write_u8(scancode);
                self.write_i16(char_code);
            }
            InputEvent::KeyUp { scancode } => self.write_u8(scancode),
            InputEvent::MouseWheel { delta } => self.write_i16(delta),
        }
        Ok(())
    }

    fn write_u8(&mut self, value: u8) {
        self.buffer[self.len] = value;
        self.len += 1;
    }

    fn write_i16(&mut self, value: i16) {
        self.buffer[self.len..self.len + 2].copy_from_slice(&value.to_be_bytes());
        self.len += 2;
    }

    /// Take the accumulated records as one message, or nothing if empty
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.len == 0 {
            return None;
        }
        let message = self.buffer[..self.len].to_vec();
        self.len = 0;
        self.flushed_messages += 1;
        Some(message)
    }

    /// Drop pending records, used when the session restarts
    pub fn reset(&mut self) {
        self.len = 0;
    }
}

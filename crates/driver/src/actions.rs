//! W3C Actions encoder
//!
//! Two input sources, one keyboard and one pointer, advance in lockstep: every
//! primitive appended to one device appends a zero-duration pause to the
//! other, so both queues always have the same length. Composite operations
//! expand into primitives in a fixed order.
//!
//! [`ActionSequence::perform`] sends both queues as one `performActions`
//! command and keeps them, so a sequence can be replayed.
//! [`ActionSequence::clear`] empties them and asks the server to release held
//! keys and buttons.

use std::time::Duration;

use serde::{Serialize, Serializer};
use serde_json::{json, Value};

use crate::command::{PERFORM_ACTIONS, RELEASE_ACTIONS};
use crate::driver::{ElementRef, Invoker};
use crate::error::Result;

/// Pointer travel time used by element-targeted composites.
pub const MOVE_DURATION: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Left,
    Middle,
    Right,
}

impl Button {
    fn code(self) -> u8 {
        match self {
            Button::Left => 0,
            Button::Middle => 1,
            Button::Right => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerKind {
    Mouse,
    Pen,
    Touch,
}

/// Where pointer-move coordinates are measured from.
#[derive(Debug, Clone, PartialEq)]
pub enum Origin {
    Viewport,
    /// Current pointer position.
    Pointer,
    Element(ElementRef),
}

impl Serialize for Origin {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Origin::Viewport => serializer.serialize_str("viewport"),
            Origin::Pointer => serializer.serialize_str("pointer"),
            Origin::Element(element) => element.serialize(serializer),
        }
    }
}

/// One tick of input on one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Action {
    #[serde(rename = "keyDown")]
    KeyDown { value: String },
    #[serde(rename = "keyUp")]
    KeyUp { value: String },
    #[serde(rename = "pointerDown")]
    PointerDown { button: u8 },
    #[serde(rename = "pointerUp")]
    PointerUp { button: u8 },
    #[serde(rename = "pointerMove")]
    PointerMove {
        duration: u64,
        origin: Origin,
        x: i64,
        y: i64,
    },
    #[serde(rename = "pause")]
    Pause { duration: u64 },
}

impl Action {
    fn pause(duration: Duration) -> Self {
        Action::Pause {
            duration: duration.as_millis() as u64,
        }
    }

    fn idle() -> Self {
        Action::Pause { duration: 0 }
    }

    pub fn is_pause(&self) -> bool {
        matches!(self, Action::Pause { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Key,
    Pointer(PointerKind),
}

/// A virtual input source and its queued actions.
#[derive(Debug, Clone)]
pub struct InputDevice {
    id: String,
    kind: DeviceKind,
    actions: Vec<Action>,
}

impl InputDevice {
    pub fn keyboard(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: DeviceKind::Key,
            actions: Vec::new(),
        }
    }

    pub fn pointer(id: impl Into<String>, kind: PointerKind) -> Self {
        Self {
            id: id.into(),
            kind: DeviceKind::Pointer(kind),
            actions: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Input source object of the `performActions` payload.
    pub fn to_json(&self) -> Value {
        match self.kind {
            DeviceKind::Key => json!({
                "type": "key",
                "id": self.id,
                "actions": self.actions,
            }),
            DeviceKind::Pointer(kind) => json!({
                "type": "pointer",
                "id": self.id,
                "parameters": { "pointerType": kind },
                "actions": self.actions,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActionSequence {
    keyboard: InputDevice,
    pointer: InputDevice,
}

impl Default for ActionSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionSequence {
    pub fn new() -> Self {
        Self::with_pointer(PointerKind::Mouse)
    }

    pub fn with_pointer(kind: PointerKind) -> Self {
        Self {
            keyboard: InputDevice::keyboard("default keyboard"),
            pointer: InputDevice::pointer("default mouse", kind),
        }
    }

    pub fn keyboard(&self) -> &InputDevice {
        &self.keyboard
    }

    pub fn pointer(&self) -> &InputDevice {
        &self.pointer
    }

    pub fn is_empty(&self) -> bool {
        self.keyboard.actions.is_empty() && self.pointer.actions.is_empty()
    }

    fn push_key(&mut self, action: Action) -> &mut Self {
        self.keyboard.actions.push(action);
        self.pointer.actions.push(Action::idle());
        self
    }

    fn push_pointer(&mut self, action: Action) -> &mut Self {
        self.pointer.actions.push(action);
        self.keyboard.actions.push(Action::idle());
        self
    }

    fn move_action(origin: Origin, x: i64, y: i64) -> Action {
        Action::PointerMove {
            duration: MOVE_DURATION.as_millis() as u64,
            origin,
            x,
            y,
        }
    }

    pub fn pointer_down(&mut self, button: Button) -> &mut Self {
        self.push_pointer(Action::PointerDown {
            button: button.code(),
        })
    }

    pub fn pointer_up(&mut self, button: Button) -> &mut Self {
        self.push_pointer(Action::PointerUp {
            button: button.code(),
        })
    }

    /// Move to the element's center.
    pub fn move_to(&mut self, element: &ElementRef) -> &mut Self {
        self.move_to_offset(element, 0, 0)
    }

    /// Move to an offset from the element's center.
    pub fn move_to_offset(&mut self, element: &ElementRef, x: i64, y: i64) -> &mut Self {
        self.push_pointer(Self::move_action(Origin::Element(element.clone()), x, y))
    }

    /// Move relative to the current pointer position.
    pub fn move_by(&mut self, x: i64, y: i64) -> &mut Self {
        self.push_pointer(Self::move_action(Origin::Pointer, x, y))
    }

    pub fn move_to_location(&mut self, x: i64, y: i64) -> &mut Self {
        self.push_pointer(Self::move_action(Origin::Viewport, x, y))
    }

    /// Click at the current position.
    pub fn click(&mut self) -> &mut Self {
        self.pointer_down(Button::Left).pointer_up(Button::Left)
    }

    pub fn click_on(&mut self, element: &ElementRef) -> &mut Self {
        self.move_to(element).click()
    }

    pub fn double_click(&mut self, element: &ElementRef) -> &mut Self {
        self.move_to(element).click().click()
    }

    pub fn context_click(&mut self, element: &ElementRef) -> &mut Self {
        self.move_to(element)
            .pointer_down(Button::Right)
            .pointer_up(Button::Right)
    }

    pub fn key_down(&mut self, key: &str) -> &mut Self {
        self.push_key(Action::KeyDown {
            value: key.to_string(),
        })
    }

    pub fn key_up(&mut self, key: &str) -> &mut Self {
        self.push_key(Action::KeyUp {
            value: key.to_string(),
        })
    }

    /// Click the element to focus it, then press `key` down.
    pub fn key_down_on(&mut self, element: &ElementRef, key: &str) -> &mut Self {
        self.click_on(element).key_down(key)
    }

    pub fn key_up_on(&mut self, element: &ElementRef, key: &str) -> &mut Self {
        self.click_on(element).key_up(key)
    }

    pub fn key_press(&mut self, key: &str) -> &mut Self {
        self.key_down(key).key_up(key)
    }

    pub fn key_press_on(&mut self, element: &ElementRef, key: &str) -> &mut Self {
        self.click_on(element).key_press(key)
    }

    /// Type `text` one character at a time.
    pub fn send_keys(&mut self, text: &str) -> &mut Self {
        let mut buf = [0u8; 4];
        for c in text.chars() {
            self.key_press(c.encode_utf8(&mut buf));
        }
        self
    }

    pub fn send_keys_to(&mut self, element: &ElementRef, text: &str) -> &mut Self {
        self.click_on(element).send_keys(text)
    }

    pub fn drag_and_drop(&mut self, source: &ElementRef, target: &ElementRef) -> &mut Self {
        self.move_to(source)
            .pointer_down(Button::Left)
            .move_to(target)
            .pointer_up(Button::Left)
    }

    pub fn drag_and_drop_by(&mut self, source: &ElementRef, x: i64, y: i64) -> &mut Self {
        self.move_to(source)
            .pointer_down(Button::Left)
            .move_by(x, y)
            .pointer_up(Button::Left)
    }

    /// Idle both devices for one tick of `duration`.
    pub fn pause(&mut self, duration: Duration) -> &mut Self {
        self.push_pointer(Action::pause(duration))
    }

    /// The `performActions` payload.
    pub fn to_json(&self) -> Value {
        json!({ "actions": [self.keyboard.to_json(), self.pointer.to_json()] })
    }

    /// Dispatch both queues as one command. Queues are kept.
    pub async fn perform<I: Invoker + ?Sized>(&self, invoker: &I) -> Result<()> {
        tracing::debug!(ticks = self.pointer.actions.len(), "performing actions");
        invoker.execute(PERFORM_ACTIONS, Some(self.to_json())).await?;
        Ok(())
    }

    /// Empty both queues and release server-side input state. The queues are
    /// emptied even when the release fails.
    pub async fn clear<I: Invoker + ?Sized>(&mut self, invoker: &I) -> Result<()> {
        self.keyboard.actions.clear();
        self.pointer.actions.clear();

        if let Err(e) = invoker.execute(RELEASE_ACTIONS, None).await {
            tracing::warn!(error = %e, "release actions failed");
            return Err(e);
        }
        Ok(())
    }
}

/// Key values for non-printing keys.
pub mod keys {
    pub const NULL: &str = "\u{E000}";
    pub const CANCEL: &str = "\u{E001}";
    pub const HELP: &str = "\u{E002}";
    pub const BACKSPACE: &str = "\u{E003}";
    pub const TAB: &str = "\u{E004}";
    pub const CLEAR: &str = "\u{E005}";
    pub const RETURN: &str = "\u{E006}";
    pub const ENTER: &str = "\u{E007}";
    pub const SHIFT: &str = "\u{E008}";
    pub const CONTROL: &str = "\u{E009}";
    pub const ALT: &str = "\u{E00A}";
    pub const PAUSE: &str = "\u{E00B}";
    pub const ESCAPE: &str = "\u{E00C}";
    pub const SPACE: &str = "\u{E00D}";
    pub const PAGE_UP: &str = "\u{E00E}";
    pub const PAGE_DOWN: &str = "\u{E00F}";
    pub const END: &str = "\u{E010}";
    pub const HOME: &str = "\u{E011}";
    pub const LEFT: &str = "\u{E012}";
    pub const UP: &str = "\u{E013}";
    pub const RIGHT: &str = "\u{E014}";
    pub const DOWN: &str = "\u{E015}";
    pub const INSERT: &str = "\u{E016}";
    pub const DELETE: &str = "\u{E017}";
    pub const F1: &str = "\u{E031}";
    pub const F5: &str = "\u{E035}";
    pub const F12: &str = "\u{E03C}";
    pub const META: &str = "\u{E03D}";
}

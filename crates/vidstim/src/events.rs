//! Mapping egui window events to core input events.
//!
//! Only discrete presses are forwarded: key repeats, releases, pointer
//! motion, and text input are not playback-relevant and are filtered out
//! here rather than in the router.

use vidstim_core::input::InputEvent;

/// Maps one egui event to a core [`InputEvent`], if it is playback-relevant.
pub fn map_event(event: &egui::Event) -> Option<InputEvent> {
    match event {
        egui::Event::Key {
            key,
            pressed: true,
            repeat: false,
            ..
        } => Some(InputEvent::Key(key.name().to_string())),
        egui::Event::PointerButton {
            button,
            pressed: true,
            ..
        } => Some(InputEvent::MouseButton(button_number(*button))),
        _ => None,
    }
}

/// Numbers mouse buttons the conventional way: 1 left, 2 middle, 3 right.
fn button_number(button: egui::PointerButton) -> u8 {
    match button {
        egui::PointerButton::Primary => 1,
        egui::PointerButton::Middle => 2,
        egui::PointerButton::Secondary => 3,
        egui::PointerButton::Extra1 => 4,
        egui::PointerButton::Extra2 => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_event(key: egui::Key, pressed: bool, repeat: bool) -> egui::Event {
        egui::Event::Key {
            key,
            physical_key: None,
            pressed,
            repeat,
            modifiers: egui::Modifiers::default(),
        }
    }

    #[test]
    fn test_key_press_maps_to_key_name() {
        let event = key_event(egui::Key::Escape, true, false);
        let mapped = map_event(&event).unwrap();
        assert_eq!(mapped, InputEvent::Key("Escape".to_string()));
        assert!(mapped.is_escape());

        let event = key_event(egui::Key::Space, true, false);
        assert_eq!(map_event(&event), Some(InputEvent::Key("Space".to_string())));
    }

    #[test]
    fn test_releases_and_repeats_are_ignored() {
        assert_eq!(map_event(&key_event(egui::Key::A, false, false)), None);
        assert_eq!(map_event(&key_event(egui::Key::A, true, true)), None);
    }

    #[test]
    fn test_pointer_button_numbering() {
        let press = |button| egui::Event::PointerButton {
            pos: egui::Pos2::ZERO,
            button,
            pressed: true,
            modifiers: egui::Modifiers::default(),
        };
        assert_eq!(
            map_event(&press(egui::PointerButton::Primary)),
            Some(InputEvent::MouseButton(1))
        );
        assert_eq!(
            map_event(&press(egui::PointerButton::Middle)),
            Some(InputEvent::MouseButton(2))
        );
        assert_eq!(
            map_event(&press(egui::PointerButton::Secondary)),
            Some(InputEvent::MouseButton(3))
        );

        let release = egui::Event::PointerButton {
            pos: egui::Pos2::ZERO,
            button: egui::PointerButton::Primary,
            pressed: false,
            modifiers: egui::Modifiers::default(),
        };
        assert_eq!(map_event(&release), None);
    }

    #[test]
    fn test_unrelated_events_are_ignored() {
        assert_eq!(map_event(&egui::Event::Text("x".to_string())), None);
        assert_eq!(
            map_event(&egui::Event::PointerMoved(egui::Pos2::ZERO)),
            None
        );
    }
}

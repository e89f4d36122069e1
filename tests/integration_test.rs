use glam::Vec2;
use lou::bridge::handle_of;
use lou::config::HostConfig;
use lou::core::Host;
use lou::natives::{Color, Rect, Severity};
use lou::platform::{DrawCommand, HeadlessProbe, HostEvent, PointerButton};
use rquickjs::Value;

fn host() -> (Host, HeadlessProbe) {
    let mut config = HostConfig::default();
    config.console.echo = false;
    Host::headless(config).unwrap()
}

fn comments(host: &Host) -> Vec<String> {
    host.console_entries()
        .into_iter()
        .filter(|entry| entry.severity == Severity::Comment)
        .map(|entry| entry.message)
        .collect()
}

#[test]
fn test_update_subscription_records_dt() {
    let (host, _probe) = host();
    assert!(host.eval("lou.on_update((dt) => print('dt', dt));", "test"));

    let report = host.advance(0.016);
    assert_eq!(report.invoked, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(comments(&host), ["dt 0.016"]);
    assert!(host.console_errors().is_empty());
}

#[test]
fn test_callbacks_run_in_order_and_isolate_errors() {
    let (host, _probe) = host();
    assert!(host.eval(
        r#"
        lou.on_update(() => print('a'));
        lou.on_update(() => { throw new Error('boom'); });
        lou.on_update(() => print('c'));
        "#,
        "test",
    ));

    let report = host.advance(0.5);
    assert_eq!(report.invoked, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(comments(&host), ["a", "c"]);
    let errors = host.console_errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("on_update: Error: boom"), "{}", errors[0]);
}

#[test]
fn test_unbind_is_idempotent() {
    let (host, _probe) = host();
    assert!(host.eval(
        r#"
        const sub = lou.on_update(() => print('never'));
        sub.unbind();
        sub.destroy();
        print(sub.active, String(sub));
        "#,
        "test",
    ));
    assert_eq!(host.advance(0.1).invoked, 0);
    assert_eq!(comments(&host), ["false Subscription(on_update #1, inert)"]);
}

#[test]
fn test_geometry_values() {
    let (host, _probe) = host();
    assert!(host.eval(
        r#"
        const r = Rect(1, 2, 3, 4);
        r.x = 10;
        print(String(r));
        print(r.as_tuple().join(','));
        const v = Vec2(1, 2).add(Vec2(3, 4)).mul(2);
        print(`${v}`, v.neg().x, Vec2(3, 4).length());
        const c = Color(1, 2, 3);
        print(String(c), c.a);
        "#,
        "test",
    ));
    assert_eq!(
        comments(&host),
        [
            "Rect: {10, 2, 3, 4}",
            "10,2,3,4",
            "Vec2(8, 12) -8 5",
            "Color(1, 2, 3, 255) 255"
        ]
    );
}

#[test]
fn test_script_errors_name_types_and_methods() {
    let (host, _probe) = host();
    let cases = [
        ("lou.renderer.draw_rect(Vec2(1, 2))", "expected Rect, got Vec2"),
        ("lou.window.fly()", "no such method for Window -> fly"),
        ("Rect().zz = 1", "invalid field 'zz' for Rect"),
        ("lou.mouse.x = 3", "field 'x' of Mouse is readonly"),
        ("Color(300)", "bad argument #1 to 'Color' (integer in 0..=255 expected, got 300)"),
        ("lou.renderer.set_blend_mode('screen')", "unknown blend mode 'screen'"),
    ];
    for (source, expected) in cases {
        assert!(!host.eval(source, "test"), "{source} should fail");
        let errors = host.console_errors();
        let last = errors.last().unwrap();
        assert!(last.contains(expected), "{source}: {last}");
    }
}

#[test]
fn test_wrong_handle_argument_is_a_type_error() {
    let (host, _probe) = host();
    assert!(host.eval(
        r#"
        try { lou.renderer.draw_rect(Vec2()); } catch (e) { print(e instanceof TypeError, e.message); }
        try { lou.renderer.render_texture(Rect()); } catch (e) { print(e instanceof TypeError); }
        try { Color(300); } catch (e) { print(e instanceof RangeError); }
        "#,
        "test",
    ));
    assert_eq!(
        comments(&host),
        [
            "true bad argument #1 to 'Renderer.draw_rect' (expected Rect, got Vec2)",
            "true",
            "true"
        ]
    );
}

#[test]
fn test_probe_keys_read_as_undefined() {
    let (host, _probe) = host();
    assert!(host.eval(
        "print(typeof lou.window.then, typeof lou.window.resize, JSON.stringify({ w: Rect(1) }) !== undefined);",
        "test",
    ));
    assert_eq!(comments(&host), ["undefined function true"]);
}

#[test]
fn test_handles_resolve_to_native_objects() {
    let (host, _probe) = host();
    let roots = host.roots();
    host.with(|ctx, bridge| {
        let window: Value = ctx.eval("lou.window").unwrap();
        let handle = handle_of(&window).unwrap();
        assert_eq!(handle.key(), roots.window.key());

        let again: Value = ctx.eval("lou.window").unwrap();
        let first = bridge.store().native::<lou::natives::Window>(handle.key()).unwrap();
        let second = bridge
            .store()
            .native::<lou::natives::Window>(handle_of(&again).unwrap().key())
            .unwrap();
        assert!(first.ptr_eq(&second));

        let rect = bridge.create_owning(&ctx, Rect::new(1.0, 2.0, 3.0, 4.0)).unwrap();
        let resolved = bridge.store().resolve_value::<Rect>(&rect).unwrap();
        assert_eq!(*resolved.borrow().unwrap(), Rect::new(1.0, 2.0, 3.0, 4.0));

        let err = bridge.store().resolve_value::<Color>(&rect).err().unwrap();
        assert_eq!(err.to_string(), "expected Color, got Rect");
    });
}

#[test]
fn test_frame_draws_and_presents() {
    let (mut host, probe) = host();
    assert!(host.eval(
        r#"
        lou.on_render(() => {
            const r = lou.renderer;
            r.set_draw_color(Color(255, 0, 0));
            r.fill_rect(Rect(0, 0, 10, 10));
            r.draw_line(0, 0, Vec2(5, 5));
        });
        "#,
        "test",
    ));
    assert!(host.frame());

    let red = Color::new(255, 0, 0, 255);
    assert_eq!(
        probe.commands(),
        vec![
            DrawCommand::Clear(Color::BLACK),
            DrawCommand::Rect {
                rect: Rect::new(0.0, 0.0, 10.0, 10.0),
                filled: true,
                color: red,
            },
            DrawCommand::Line {
                from: Vec2::ZERO,
                to: Vec2::new(5.0, 5.0),
                color: red,
            },
            DrawCommand::Present,
        ]
    );
    assert_eq!(host.frames(), 1);
}

#[test]
fn test_events_become_callback_calls_in_order() {
    let (mut host, probe) = host();
    assert!(host.eval(
        r#"
        const kb = lou.keyboard;
        kb.pressed((key) => print('down', key, kb.is_down(key)));
        kb.released((key) => print('up', key, kb.is_pressed(key)));
        lou.mouse.moved((x, y) => print('move', x, y));
        lou.mouse.pressed((button, x, y) => print('click', button, x, y, lou.mouse.position().join(',')));
        "#,
        "test",
    ));

    probe.push(HostEvent::KeyDown { key: "a".into() });
    probe.push(HostEvent::PointerMove { x: 3.0, y: 4.0 });
    probe.push(HostEvent::PointerButton {
        button: PointerButton::Left,
        pressed: true,
        x: 5.0,
        y: 6.0,
    });
    probe.push(HostEvent::KeyUp { key: "a".into() });
    assert_eq!(host.process_events(), 4);

    assert_eq!(
        comments(&host),
        ["down a true", "move 3 4", "click left 5 6 5,6", "up a false"]
    );
}

#[test]
fn test_script_quit_stops_the_loop() {
    let (mut host, _probe) = host();
    assert!(host.eval("let n = 0; lou.on_update(() => { n += 1; if (n === 3) lou.quit(); });", "test"));
    assert_eq!(host.run_loop(), 3);
    assert!(!host.is_running());
}

#[test]
fn test_host_quit() {
    let (mut host, _probe) = host();
    assert!(host.frame());
    host.quit();
    assert!(!host.frame());
}

#[test]
fn test_host_quit_event() {
    let (mut host, probe) = host();
    probe.push(HostEvent::Quit);
    assert!(!host.frame());
}

#[test]
fn test_window_methods() {
    let (host, _probe) = host();
    assert!(host.eval(
        r#"
        const w = lou.window;
        w.resize(640, 480);
        w.reposition(10, 20);
        w.set_title('demo');
        const [width, height] = w.size();
        print(width, height, w.aspect_ratio(), w.position().join(','), w.title());
        "#,
        "test",
    ));
    assert_eq!(comments(&host), ["640 480 1.3333333333333333 10,20 demo"]);
    assert!(!host.eval("lou.window.resize(0, 10)", "test"));
}

#[test]
fn test_globals_are_frozen() {
    let (host, _probe) = host();
    assert!(!host.eval("globalThis.leak = 1;", "test"));
    assert!(host.eval("print(typeof globalThis.leak);", "test"));
    assert_eq!(comments(&host), ["undefined"]);
}

#[test]
fn test_collectgarbage_reports_and_collects() {
    let (host, _probe) = host();
    assert!(host.eval(
        r#"
        const before = collectgarbage('count');
        print(typeof before, before > 0, collectgarbage() === undefined);
        try { collectgarbage('stop'); } catch (e) { print(e.message); }
        "#,
        "test",
    ));
    assert_eq!(
        comments(&host),
        [
            "number true true",
            "collectgarbage must be called with 'count' or 'collect'"
        ]
    );
}

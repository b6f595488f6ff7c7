use super::*;

const EPS: f64 = 1e-9;

fn ids(raw: &[&str]) -> Vec<ProcessId> {
    raw.iter().map(|id| ProcessId::new(*id)).collect()
}

#[test]
fn four_processes_land_on_the_axes() {
    let ordered = ids(&["p0", "p1", "p2", "p3"]);
    let placed = circular_layout(&ordered, 300.0, 50.0, &mut RandomJitter::seeded(7));

    let expected = [(300.0, 0.0), (0.0, 300.0), (-300.0, 0.0), (0.0, -300.0)];
    for ((process_id, position), (x, y)) in placed.iter().zip(expected) {
        assert!((position.x - x).abs() < EPS, "{process_id} x={}", position.x);
        assert!((position.y - y).abs() < EPS, "{process_id} y={}", position.y);
        assert!(position.z.abs() <= 50.0, "{process_id} z={}", position.z);
    }
    assert_eq!(placed[0].0.as_str(), "p0");
    assert_eq!(placed[3].0.as_str(), "p3");
}

#[test]
fn xy_are_bit_for_bit_reproducible() {
    let ordered = ids(&["a", "b", "c", "d", "e", "f", "g"]);
    let first = circular_layout(&ordered, 300.0, 50.0, &mut RandomJitter::seeded(1));
    let second = circular_layout(&ordered, 300.0, 50.0, &mut RandomJitter::seeded(99));

    for ((_, a), (_, b)) in first.iter().zip(second.iter()) {
        assert_eq!(a.x.to_bits(), b.x.to_bits());
        assert_eq!(a.y.to_bits(), b.y.to_bits());
    }
}

#[test]
fn jitter_is_clamped_to_amplitude() {
    let ordered = ids(&["a", "b", "c"]);
    let mut jitter = ScriptedJitter::new(vec![500.0, -500.0, 12.5]);
    let placed = circular_layout(&ordered, 100.0, 50.0, &mut jitter);
    let zs: Vec<f64> = placed.iter().map(|(_, p)| p.z).collect();
    assert_eq!(zs, vec![50.0, -50.0, 12.5]);
}

#[test]
fn zero_amplitude_keeps_plane_flat() {
    let ordered = ids(&["a", "b"]);
    let mut jitter = ScriptedJitter::new(vec![10.0]);
    let placed = circular_layout(&ordered, 100.0, 0.0, &mut jitter);
    assert!(placed.iter().all(|(_, p)| p.z == 0.0));
}

#[test]
fn empty_and_single_inputs() {
    assert!(circular_layout(&[], 300.0, 50.0, &mut NoJitter).is_empty());

    let placed = circular_layout(&ids(&["solo"]), 300.0, 50.0, &mut NoJitter);
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].1, Position::new(300.0, 0.0, 0.0));
}

#[test]
fn non_finite_inputs_never_panic() {
    let ordered = ids(&["a", "b"]);
    let placed = circular_layout(
        &ordered,
        f64::NAN,
        f64::INFINITY,
        &mut RandomJitter::seeded(5),
    );
    assert_eq!(placed.len(), 2);
    assert!(placed
        .iter()
        .all(|(_, p)| p.x == 0.0 && p.y == 0.0 && p.z == 0.0));
}

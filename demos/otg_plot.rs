use std::error::Error;

use gnuplot::*;
use scurve_otg::{Constraints, CycleResult, Input, KinematicState, Otg};

fn main() -> Result<(), Box<dyn Error>> {
    // -----------------------
    // 1. Set up the motion
    // -----------------------
    let delta_time = 0.01;
    let dof = 3;

    let current = vec![
        KinematicState::new(0.0, 0.0, 0.0),
        KinematicState::new(0.0, -2.2, 2.5),
        KinematicState::new(0.5, -0.5, -0.5),
    ];
    let target = vec![
        KinematicState::new(5.0, 0.0, 0.0),
        KinematicState::new(-2.0, -0.5, 0.0),
        KinematicState::new(-3.5, -2.0, 0.5),
    ];
    let constraints = vec![
        Constraints::new(3.0, 3.0, 4.0),
        Constraints::new(1.0, 2.0, 3.0),
        Constraints::new(3.0, 1.0, 2.0),
    ];

    let mut otg = Otg::create(delta_time, dof)?;
    let mut input = Input::from_states(current, target, constraints);
    if !otg.validate_input(&input, false, true) {
        return Err("Input rejected. Check limits and target states.".into());
    }

    // -----------------------------
    // 2. Run the control loop
    // -----------------------------
    let mut time_axis = Vec::new();
    let mut positions = vec![Vec::new(); dof];
    let mut velocities = vec![Vec::new(); dof];

    let mut step = 0usize;
    let duration = loop {
        let output = otg.update(&input);
        if output.result.is_error() {
            return Err(format!("Trajectory generation failed: {:?}", output.result).into());
        }

        step += 1;
        time_axis.push(step as f64 * delta_time);
        for (i, state) in output.new_state.iter().enumerate() {
            positions[i].push(state.position);
            velocities[i].push(state.velocity);
        }

        output.pass_to_input(&mut input);
        if output.result == CycleResult::Finished {
            break output.trajectory_duration().unwrap_or_default();
        }
    };

    // --------------
    // 3. Plot data
    // --------------
    let colors = ["blue", "red", "green"];
    let mut fg = Figure::new();
    {
        let axes = fg.axes2d();
        axes.set_title("Synchronized position and velocity vs. time", &[]);
        axes.set_x_label("Time (s)", &[]);
        for i in 0..dof {
            let pos_caption = format!("Position {i}");
            let vel_caption = format!("Velocity {i}");
            axes.lines(
                &time_axis,
                &positions[i],
                &[Color(colors[i]), Caption(pos_caption.as_str())],
            );
            axes.lines(
                &time_axis,
                &velocities[i],
                &[Color(colors[i]), Caption(vel_caption.as_str())],
            );
        }
    }

    // Attempt to show in a pop-up window (might require gnuplot installed)
    fg.show().map_err(|e| format!("Failed to display plot: {e}"))?;

    println!("Plot generated. Trajectory duration: {duration:.3} seconds.");
    Ok(())
}

use clap::{Parser, ValueEnum};
use dwb_core::mk_static;
use dwb_core::utils::controllers::{
    EdgeError, EdgeMode, EdgeSource, EncoderConfig, Motor, MotorConfig, MovementConfig, PulseCounter, PwmOutput,
    SharedPwm,
};
use dwb_core::utils::math::kinematics::{ChassisGeometry, CurvePlan, Differential, GeometryError, SkidSteer};
use dwb_core::utils::{CancelSignal, Movement};
use embedded_hal_mock::eh1::delay::StdSleep;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

// host critical-section implementation for the cancel signal
use critical_section as _;

static LEFT_COUNT: PulseCounter = PulseCounter::new();
static RIGHT_COUNT: PulseCounter = PulseCounter::new();
static CANCEL: CancelSignal = CancelSignal::new();
static WINDOWS: [AtomicU16; 16] = [const { AtomicU16::new(0) }; 16];
static RUNNING: AtomicBool = AtomicBool::new(true);

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts
{
    /// Speed on the 0-100 scale
    #[clap(long, default_value_t = 75.0)]
    speed: f32,
    /// Distance in cm for a straight move (0 = whole sampling window)
    #[clap(long, default_value_t = 0.0)]
    length: f32,
    /// Drive backwards
    #[clap(long)]
    back: bool,
    /// Curve instead of a straight line
    #[clap(long, value_enum)]
    turn: Option<Turn>,
    /// Curve radius from the chassis center (cm)
    #[clap(long, default_value_t = 30.0)]
    radius: f32,
    /// Curve angle (degrees)
    #[clap(long, default_value_t = 90.0)]
    angle: f32,
    /// Right wheel efficiency relative to the left one
    #[clap(long, default_value_t = 1.0)]
    skew: f32,
    /// Encoder edges per second at full duty
    #[clap(long, default_value_t = 600.0)]
    edge_rate: f32,
    /// Abort the move after this many milliseconds
    #[clap(long)]
    cancel_after_ms: Option<u64>,
    /// JSON robot description
    #[clap(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Turn {
    Left,
    Right,
}

/// Chassis layout selected at runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Chassis {
    Differential(Differential),
    SkidSteer(SkidSteer),
}

impl Chassis {
    /// Re-run the constructor checks skipped by deserialization.
    fn validated(self) -> Result<Self, GeometryError> {
        Ok(match self {
            Chassis::Differential(d) => Chassis::Differential(Differential::new(d.track())?),
            Chassis::SkidSteer(s) => Chassis::SkidSteer(SkidSteer::new(s.track(), s.scrub())?),
        })
    }
}

impl ChassisGeometry for Chassis {
    fn track(&self) -> f32 {
        match self {
            Chassis::Differential(d) => d.track(),
            Chassis::SkidSteer(s) => s.track(),
        }
    }

    fn curve_plan(
        &self,
        speed: f32,
        radius: f32,
        angle: f32,
        is_left: bool,
    ) -> Result<CurvePlan, GeometryError> {
        match self {
            Chassis::Differential(d) => d.curve_plan(speed, radius, angle, is_left),
            Chassis::SkidSteer(s) => s.curve_plan(speed, radius, angle, is_left),
        }
    }
}

/// Everything needed to assemble the simulated robot.
#[derive(Debug, Serialize, Deserialize)]
struct RobotConfig {
    left: MotorConfig,
    right: MotorConfig,
    chassis: Chassis,
    #[serde(default)]
    movement: MovementConfig,
}

impl RobotConfig {
    /// Bench robot: L298N sides on channels 0-2 and 4-6, encoders on pins 34/35.
    fn bench() -> Result<Self, GeometryError> {
        let motor = |enable, pin| MotorConfig {
            enable_channel: enable,
            in1_channel: enable + 1,
            in2_channel: enable + 2,
            encoder: Some(EncoderConfig {
                pin,
                edges_per_revolution: 20,
                mode: EdgeMode::Change,
            }),
            wheel_radius: 3.4,
            perimeter: Some(21.5),
            inverted: false,
        };
        Ok(Self {
            left: motor(0, 34),
            right: motor(4, 35),
            chassis: Chassis::Differential(Differential::new(12.0)?),
            movement: MovementConfig::default(),
        })
    }
}

/// PWM expander that logs every write and mirrors the windows for the simulator.
struct ConsolePwm;

impl PwmOutput for ConsolePwm {
    type Error = Infallible;

    fn initialize(&mut self) -> Result<(), Self::Error> {
        info!("PWM expander initialized");
        Ok(())
    }

    fn set_channel_window(
        &mut self,
        channel: u8,
        on_tick: u16,
        off_tick: u16,
    ) -> Result<(), Self::Error> {
        debug!("PWM ch{}: {}..{}", channel, on_tick, off_tick);
        WINDOWS[channel as usize].store(off_tick, Ordering::Relaxed);
        Ok(())
    }
}

/// Edge source binding encoder pins to the simulated wheels.
#[derive(Default)]
struct SimEdges {
    attached: Vec<(u8, &'static PulseCounter)>,
}

impl EdgeSource<'static> for SimEdges {
    fn attach(
        &mut self,
        pin: u8,
        mode: EdgeMode,
        counter: &'static PulseCounter,
    ) -> Result<(), EdgeError> {
        if self.attached.iter().any(|(p, _)| *p == pin) {
            return Err(EdgeError::AlreadyAttached(pin));
        }
        info!("Encoder on pin {} ({:?})", pin, mode);
        self.attached.push((pin, counter));
        Ok(())
    }
}

/// One simulated wheel: edges follow the enable-channel duty.
struct SimWheel {
    enable_channel: u8,
    counter: &'static PulseCounter,
    efficiency: f32,
}

fn spawn_wheels(
    wheels: Vec<SimWheel>,
    edge_rate: f32,
) -> thread::JoinHandle<()> {
    const STEP_MS: u64 = 5;
    thread::spawn(move || {
        let mut carry = vec![0.0f32; wheels.len()];
        while RUNNING.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(STEP_MS));
            for (wheel, carry) in wheels.iter().zip(carry.iter_mut()) {
                let duty = WINDOWS[wheel.enable_channel as usize].load(Ordering::Relaxed) as f32 / 4095.0;
                let exact = duty * edge_rate * wheel.efficiency * STEP_MS as f32 / 1000.0 + *carry;
                let whole = exact.floor();
                *carry = exact - whole;
                for _ in 0..whole as u32 {
                    wheel.counter.on_edge();
                }
            }
        }
    })
}

fn load_config(opts: &Opts) -> Result<RobotConfig, String> {
    let Some(path) = &opts.config else {
        return RobotConfig::bench().map_err(|e| format!("{:?}", e));
    };
    let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let mut config: RobotConfig = serde_json::from_str(&text).map_err(|e| format!("{}: {}", path.display(), e))?;
    config.chassis = config.chassis.validated().map_err(|e| format!("{:?}", e))?;
    Ok(config)
}

fn run(opts: Opts) -> Result<(), String> {
    let config = load_config(&opts)?;
    info!("Robot: {:?}", config);

    let pwm: &'static SharedPwm<ConsolePwm> = mk_static!(SharedPwm<ConsolePwm>, SharedPwm::new(ConsolePwm));
    let left = Motor::new(pwm, config.left, &LEFT_COUNT).map_err(|e| format!("left motor: {:?}", e))?;
    let right = Motor::new(pwm, config.right, &RIGHT_COUNT).map_err(|e| format!("right motor: {:?}", e))?;
    let mut movement =
        Movement::new(left, right, config.chassis, config.movement, &CANCEL).map_err(|e| format!("{:?}", e))?;

    let mut edges = SimEdges::default();
    movement.begin(&mut edges).map_err(|e| format!("{:?}", e))?;

    let wheels = [(&config.left, 1.0), (&config.right, opts.skew)]
        .into_iter()
        .filter_map(|(motor, efficiency)| {
            let pin = motor.encoder?.pin;
            let &(_, counter) = edges.attached.iter().find(|(p, _)| *p == pin)?;
            Some(SimWheel {
                enable_channel: motor.enable_channel,
                counter,
                efficiency,
            })
        })
        .collect();
    let sim = spawn_wheels(wheels, opts.edge_rate);

    if let Some(ms) = opts.cancel_after_ms {
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(ms));
            info!("Cancelling after {}ms", ms);
            CANCEL.signal(());
        });
    }

    let mut delay = StdSleep::new();
    let result = match opts.turn {
        Some(Turn::Left) => movement.left(&mut delay, opts.speed, opts.radius, opts.angle),
        Some(Turn::Right) => movement.right(&mut delay, opts.speed, opts.radius, opts.angle),
        None => movement.line(&mut delay, opts.speed, opts.length, !opts.back),
    };

    RUNNING.store(false, Ordering::Relaxed);
    let _ = sim.join();

    let report = result.map_err(|e| format!("{:?}", e))?;
    for (i, sample) in movement.samples().iter().enumerate() {
        info!("sample {}: {:?}", i, sample);
    }
    info!(
        "{:?} / {:?} after {} ticks, {} corrections, counts L {} R {}",
        report.mode,
        report.finish,
        report.ticks,
        report.corrections,
        LEFT_COUNT.get(),
        RIGHT_COUNT.get()
    );
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let opts: Opts = Opts::parse();
    if let Err(e) = run(opts) {
        error!("{}", e);
        std::process::exit(1);
    }
}

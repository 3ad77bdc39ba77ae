use core::cell::RefCell;

use dwb_core::utils::controllers::{EdgeError, EdgeMode, EdgeSource, Motor, MotorConfig, PulseCounter, PwmOutput};
use embedded_hal_bus::i2c::RefCellDevice;
use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTrans};
use pwm_pca9685::{Address as PwmAddress, Error as PwmError, Pca9685};

/// Default I2C address for the PWM motor controller.
pub const PWM_ADDRESS: u8 = 0x55;

/// Create a write transaction for the given I2C address and data payload.
pub fn write(
    addr: u8,
    data: Vec<u8>,
) -> I2cTrans {
    I2cTrans::write(addr, data)
}

/// Edge source for motors without encoders; binding anything is a bug.
struct NoEdges;

impl<'a> EdgeSource<'a> for NoEdges {
    fn attach(
        &mut self,
        pin: u8,
        _mode: EdgeMode,
        _counter: &'a PulseCounter,
    ) -> Result<(), EdgeError> {
        Err(EdgeError::UnsupportedPin(pin))
    }
}

#[test]
fn test_initialize_pca9685() {
    // Wake from sleep, then set prescale (sleep, prescale, restore)
    let expectations = [
        write(PWM_ADDRESS, vec![0x00, 0x01]),
        write(PWM_ADDRESS, vec![0x00, 0x11]),
        write(PWM_ADDRESS, vec![0xFE, 100]),
        write(PWM_ADDRESS, vec![0x00, 0x01]),
    ];

    let mock = I2cMock::new(&expectations);
    let i2c_bus = RefCell::new(mock);
    let mut pwm = Pca9685::new(RefCellDevice::new(&i2c_bus), PwmAddress::from(PWM_ADDRESS)).unwrap();
    pwm.initialize().unwrap();
    i2c_bus.borrow_mut().done();
}

#[test]
fn test_channel_window_on_fresh_device() {
    // First write turns on register auto-increment, then ON_L..OFF_H of channel 8
    let expectations = [
        write(PWM_ADDRESS, vec![0x00, 0x31]),
        write(PWM_ADDRESS, vec![0x26, 0x00, 0x00, 0xFF, 0x07]),
    ];

    let mock = I2cMock::new(&expectations);
    let i2c_bus = RefCell::new(mock);
    let mut pwm = Pca9685::new(RefCellDevice::new(&i2c_bus), PwmAddress::from(PWM_ADDRESS)).unwrap();
    pwm.set_channel_window(8, 0, 2047).unwrap();
    i2c_bus.borrow_mut().done();
}

#[test]
fn test_channel_out_of_range_never_reaches_bus() {
    let mock = I2cMock::new(&[]);
    let i2c_bus = RefCell::new(mock);
    let mut pwm = Pca9685::new(RefCellDevice::new(&i2c_bus), PwmAddress::from(PWM_ADDRESS)).unwrap();
    assert!(matches!(
        pwm.set_channel_window(16, 0, 100),
        Err(PwmError::InvalidInputData)
    ));
    i2c_bus.borrow_mut().done();
}

#[test]
fn test_motor_begin_over_pca9685() {
    // Initialize, enable channel 0 % duty, then IN1 full / IN2 off (clockwise)
    let expectations = [
        write(PWM_ADDRESS, vec![0x00, 0x01]),
        write(PWM_ADDRESS, vec![0x00, 0x11]),
        write(PWM_ADDRESS, vec![0xFE, 100]),
        write(PWM_ADDRESS, vec![0x00, 0x01]),
        write(PWM_ADDRESS, vec![0x00, 0x21]),
        write(PWM_ADDRESS, vec![0x26, 0x00, 0x00, 0x00, 0x00]),
        write(PWM_ADDRESS, vec![0x2A, 0x00, 0x00, 0xFF, 0x0F]),
        write(PWM_ADDRESS, vec![0x2E, 0x00, 0x00, 0x00, 0x00]),
    ];

    let mock = I2cMock::new(&expectations);
    let i2c_bus = RefCell::new(mock);
    let pwm = Pca9685::new(RefCellDevice::new(&i2c_bus), PwmAddress::from(PWM_ADDRESS)).unwrap();
    let counter = PulseCounter::new();
    let config = MotorConfig {
        enable_channel: 8,
        in1_channel: 9,
        in2_channel: 10,
        encoder: None,
        wheel_radius: 3.4,
        perimeter: None,
        inverted: false,
    };

    let mut motor = Motor::new(pwm, config, &counter).unwrap();
    motor.begin(&mut NoEdges).unwrap();
    assert!(!motor.has_interrupt());
    assert_eq!(motor.get_pwm(), 0);
    drop(motor);
    i2c_bus.borrow_mut().done();
}

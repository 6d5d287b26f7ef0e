#![no_std]
#![no_main]

use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32::can::{Can, Rx0InterruptHandler, Rx1InterruptHandler, SceInterruptHandler, TxInterruptHandler};
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_stm32::mode::Blocking;
use embassy_stm32::peripherals::CAN1;
use embassy_stm32::spi::{self, Spi, MODE_0, MODE_3};
use embassy_stm32::time::Hertz;
use embassy_stm32::{bind_interrupts, Config};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Delay, Duration, Ticker};
use static_cell::StaticCell;

use bms_balancer::adc::Ads7952;
use bms_balancer::can_management::Registry;
use bms_balancer::config::{CYCLE_PERIOD_MS, TICK_PERIOD_US};
use bms_balancer::ltc_management::Ltc6804;
use bms_balancer::scheduler::MillisCounter;
use bms_balancer::types::CommandId;
use bms_balancer::{BmsConfig, Controller};

use defmt::{error, info, warn};
use {defmt_rtt as _, panic_probe as _};

mod can_management;

use can_management::{new_can1, send_telemetry, CanReader, CanWriter};

bind_interrupts!(pub struct Irqs {
    CAN1_RX0 => Rx0InterruptHandler<CAN1>;
    CAN1_RX1 => Rx1InterruptHandler<CAN1>;
    CAN1_SCE => SceInterruptHandler<CAN1>;
    CAN1_TX => TxInterruptHandler<CAN1>;
});

type CellChips = Ltc6804<Spi<'static, Blocking>, Output<'static>, Delay>;
type ThermistorAdc = Ads7952<Spi<'static, Blocking>, Output<'static>>;
type SharedController = Mutex<CriticalSectionRawMutex, Controller>;

static MILLIS: MillisCounter = MillisCounter::new();
static TICK_EXECUTOR: InterruptExecutor = InterruptExecutor::new();
static CONTROLLER: StaticCell<SharedController> = StaticCell::new();
static CAN: StaticCell<Can<'static>> = StaticCell::new();

const CAN_BITRATE: u32 = 500_000;

// UART4 is unused on this board, its vector drives the tick executor.
#[interrupt]
unsafe fn UART4() {
    TICK_EXECUTOR.on_interrupt()
}

#[embassy_executor::main]
async fn main(spawner: Spawner) -> ! {
    let p = embassy_stm32::init(prepare_config());

    // The tick preempts the thread-mode tasks, including blocking SPI work.
    interrupt::UART4.set_priority(Priority::P6);
    let tick_spawner = TICK_EXECUTOR.start(interrupt::UART4);
    tick_spawner.spawn(tick()).unwrap();

    let config = BmsConfig::default();

    let mut ltc_config = spi::Config::default();
    ltc_config.mode = MODE_3;
    ltc_config.frequency = Hertz(1_000_000);
    let ltc_spi = Spi::new_blocking(p.SPI1, p.PA5, p.PA7, p.PA6, ltc_config);
    let lower_cs = Output::new(p.PA4, Level::High, Speed::VeryHigh);
    let upper_cs = Output::new(p.PC4, Level::High, Speed::VeryHigh);
    let mut ltc = Ltc6804::new(ltc_spi, lower_cs, upper_cs, Delay, &config);
    match ltc.init() {
        Ok(()) => info!("LTC6804 initialized"),
        Err(err) => error!("Failed to initialize LTC6804: {}", err),
    }

    let mut adc_config = spi::Config::default();
    adc_config.mode = MODE_0;
    adc_config.frequency = Hertz(4_000_000);
    let adc_spi = Spi::new_blocking(p.SPI2, p.PB13, p.PB15, p.PB14, adc_config);
    let adc_cs = Output::new(p.PB12, Level::High, Speed::VeryHigh);
    let adc = Ads7952::new(adc_spi, adc_cs);

    let controller = match Controller::new(config) {
        Ok(controller) => controller,
        Err(err) => defmt::panic!("Invalid BMS configuration: {}", err),
    };
    let controller = CONTROLLER.init(Mutex::new(controller));

    let can = CAN.init(new_can1(p.CAN1, p.PB8, p.PB9, CAN_BITRATE).await);
    let (tx, rx) = can.split();

    spawner.spawn(control(controller, ltc, adc)).unwrap();
    spawner.spawn(send_can(controller, CanWriter::new(tx))).unwrap();
    spawner.spawn(read_can(controller, CanReader::new(rx))).unwrap();

    loop {
        embassy_time::Timer::after_millis(10_000).await;
        info!("ALIVE at {} ms", MILLIS.now());
    }
}

fn prepare_config() -> Config {
    let mut config = Config::default();
    {
        use embassy_stm32::rcc::*;
        config.rcc.hse = Some(Hse {
            freq: Hertz(12_000_000),
            mode: HseMode::Oscillator,
        });

        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV6,
            mul: PllMul::MUL168,
            divp: Some(PllPDiv::DIV2),
            divq: None,
            divr: None,
        });

        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;

        config.rcc.sys = Sysclk::PLL1_P;
    }
    config
}

/// Millisecond time base, the only state written from interrupt context.
#[embassy_executor::task]
async fn tick() {
    let mut ticker = Ticker::every(Duration::from_micros(TICK_PERIOD_US));
    loop {
        ticker.next().await;
        MILLIS.tick();
    }
}

#[embassy_executor::task]
async fn control(controller: &'static SharedController, mut ltc: CellChips, mut adc: ThermistorAdc) {
    let mut ticker = Ticker::every(Duration::from_millis(CYCLE_PERIOD_MS));
    loop {
        ticker.next().await;

        let now = MILLIS.now();
        let mut controller_data = controller.lock().await;
        let report = controller_data.run_cycle(&mut ltc, &mut adc, now);
        drop(controller_data);

        if !report.is_clean() {
            warn!("Cycle at {} ms degraded: {}", now, report);
        }
    }
}

#[embassy_executor::task]
async fn send_can(controller: &'static SharedController, mut writer: CanWriter) {
    let registry = Registry::new();
    let mut ticker = Ticker::every(Duration::from_millis(CYCLE_PERIOD_MS));
    loop {
        ticker.next().await;

        let controller_data = controller.lock().await;
        let buffers = *controller_data.telemetry();
        drop(controller_data);

        if send_telemetry(&registry, &buffers, &mut writer).await.is_err() {
            warn!("Telemetry snapshot incomplete");
        }
    }
}

#[embassy_executor::task]
async fn read_can(controller: &'static SharedController, mut reader: CanReader) {
    loop {
        let frame = match reader.read().await {
            Ok(frame) => frame,
            Err(err) => {
                warn!("Can read error: {}", err);
                continue;
            }
        };

        match CommandId::from_raw(frame.id()) {
            Some(CommandId::EnableBalancing) => {
                let enabled = frame.bytes().first().is_some_and(|&b| b >= 0x1);
                controller.lock().await.set_balancing_enabled(enabled);
            }
            Some(command) => info!("Command {} not handled here", command),
            None => {}
        }
    }
}

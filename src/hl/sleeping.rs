use embedded_hal::{delay::DelayNs, digital::OutputPin};

use super::{DeviceState, RxBuffer, DW3xxx};
use crate::{
    configs::{OnWake, SleepConfig, WakeFlags},
    family::WAKE_PULSE_US,
    ll::Transport,
    Error,
};

use super::events::SysStatus;

/// Polls while waiting for the chip to come back
const WAKE_POLLS: usize = 10;

/// Clocks need about 2 ms to start after wake up
const WAKE_POLL_US: u32 = 500;

impl<B: Transport> DW3xxx<B> {
    /// Selects what the chip does on wake up and what wakes it
    pub fn configure_sleep(&mut self, config: SleepConfig) -> Result<(), Error<B>> {
        let on = |flag: OnWake| config.on_wake.contains(flag) as u8;
        self.ll.aon_dig_cfg().write(|w| {
            w.onw_aon_dld(on(OnWake::CONFIG))
                .onw_run_sar(on(OnWake::RUNSAR))
                .onw_bias_dld(on(OnWake::LOADBIAS))
                .onw_dgc_dld(on(OnWake::LOADDGC))
                .onw_ldo_dld(on(OnWake::LOADLDO))
                .onw_go2idle(on(OnWake::GOTOIDLE))
                .onw_go2rx(on(OnWake::GOTORX))
                .onw_pgfcal(on(OnWake::PGFCAL))
        })?;
        self.ll.aon_cfg().write(|w| w.value(config.wake.bits()))?;

        self.radio.sleep = config;
        Ok(())
    }

    /// Puts the chip to sleep
    ///
    /// The configuration is saved to AON memory first. With `idle_rc` the
    /// chip stays in IDLE_RC after waking up instead of moving to IDLE_PLL
    /// on its own.
    pub fn enter_sleep(&mut self, idle_rc: bool) -> Result<(), Error<B>> {
        if self.state != DeviceState::IdleRc && self.state != DeviceState::IdlePll {
            return Err(Error::WrongState);
        }
        if !self.radio.sleep.wake.contains(WakeFlags::SLP_EN) {
            warn!("sleep isn't enabled in the wake flags");
        }

        if idle_rc {
            self.ll.seq_ctrl().modify(|_, w| w.ainit2idle(0))?;
        }

        self.ll.aon_ctrl().write(|w| w)?;
        self.ll.aon_ctrl().write(|w| w.save(1))?;

        self.cal.locked = false;
        self.state = DeviceState::Sleeping;
        debug!("sleeping");
        Ok(())
    }

    /// Wakes the chip up
    ///
    /// Pulses `wake`, then waits for the chip to answer with its device
    /// identifier and to reach IDLE_RC. The TX antenna delay isn't kept in
    /// AON memory and is restored here.
    ///
    /// The handle ends up in IDLE_PLL if the chip was put to sleep from
    /// IDLE_PLL with [`OnWake::GOTOIDLE`] and the PLL locked on its own,
    /// otherwise in IDLE_RC.
    pub fn wake_up<P: OutputPin>(&mut self, wake: &mut P, delay: &mut impl DelayNs) -> Result<(), Error<B>> {
        if self.state != DeviceState::Sleeping {
            return Err(Error::WrongState);
        }

        wake.set_high().map_err(|_| Error::WakeIo)?;
        delay.delay_us(WAKE_PULSE_US);
        wake.set_low().map_err(|_| Error::WakeIo)?;

        self.ll.bus().set_slow_rate();

        let mut awake = false;
        for _ in 0..WAKE_POLLS {
            delay.delay_us(WAKE_POLL_US);
            if self.family.matches(self.ll.read32(0x00, 0x00)?) && self.check_idle_rc()? {
                awake = true;
                break;
            }
        }
        if !awake {
            return Err(Error::StillAsleep);
        }

        // With GOTOIDLE and AINIT2IDLE kept in AON the chip goes on to
        // IDLE_PLL by itself once the PLL locks
        let status = SysStatus::from_bits_retain(self.ll.sys_status().read()?.value());
        let auto_pll = self.radio.sleep.on_wake.contains(OnWake::GOTOIDLE)
            && self.ll.seq_ctrl().read()?.ainit2idle() == 1
            && status.contains(SysStatus::CP_LOCK);

        let events = SysStatus::RCINIT | SysStatus::SPIRDY | SysStatus::CP_LOCK;
        self.ll.sys_status().write(|w| w.value(events.bits()))?;

        let antenna_delay = self.radio.tx_antenna_delay;
        self.ll.tx_antd().write(|w| w.value(antenna_delay))?;

        self.radio.owned_buffer = RxBuffer::Buffer0;
        self.radio.wait_for_response = false;
        if auto_pll {
            self.ll.bus().set_fast_rate();
            self.cal.locked = true;
            self.cal.channel = Some(self.radio.channel);
            self.state = DeviceState::IdlePll;
        } else {
            self.state = DeviceState::IdleRc;
        }
        debug!("awake in {:?}", self.state);

        if self.radio.sleep.on_wake.contains(OnWake::PGFCAL) {
            self.run_pgf_cal(delay)?;
        }
        Ok(())
    }
}

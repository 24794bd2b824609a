//! Выбор платформы и устройства OpenCL

use super::bindings::*;
use super::types::*;
use crate::config::DeviceKind;
use crate::error::DeviceError;
use crate::{cl_check, cl_create};
use log::{debug, info};
use std::ptr;

/// Контекст и очередь команд одного устройства.
///
/// Создаётся один раз на участника и передаётся стратегии выгрузки,
/// между участниками не разделяется.
pub struct DeviceHandle {
    pub(crate) device: cl_device_id,
    pub(crate) context: cl_context,
    pub(crate) queue: cl_command_queue,
    name: String,
}

// Дескрипторы принадлежат одному участнику и используются из одного потока за раз
unsafe impl Send for DeviceHandle {}

impl DeviceHandle {
    /// Первое устройство нужного типа на первой платформе, где оно есть
    pub fn open(kind: DeviceKind) -> Result<Self, DeviceError> {
        let platforms = platforms()?;
        let device_type = match kind {
            DeviceKind::Gpu => CL_DEVICE_TYPE_GPU,
            DeviceKind::Cpu => CL_DEVICE_TYPE_CPU,
            DeviceKind::Any => CL_DEVICE_TYPE_ALL,
        };

        let device = platforms
            .into_iter()
            .find_map(|platform| first_device(platform, device_type))
            .ok_or(DeviceError::NoDevice)?;
        let name = device_name(device);
        debug!("Выбрано устройство OpenCL: {}", name);

        let context = cl_create!(clCreateContext(ptr::null(), 1, &device, None, ptr::null_mut()))
            .map_err(DeviceError::into_setup)?;
        let queue = match cl_create!(clCreateCommandQueue(context, device, 0)) {
            Ok(queue) => queue,
            Err(e) => {
                unsafe { clReleaseContext(context) };
                return Err(e.into_setup());
            }
        };

        info!("Устройство OpenCL готово: {}", name);
        Ok(Self { device, context, queue, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ожидает завершения всех команд в очереди
    pub fn finish(&self) -> Result<(), DeviceError> {
        cl_check!(clFinish(self.queue))
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        unsafe {
            clReleaseCommandQueue(self.queue);
            clReleaseContext(self.context);
        }
    }
}

fn platforms() -> Result<Vec<cl_platform_id>, DeviceError> {
    let mut count: cl_uint = 0;
    let code = unsafe { clGetPlatformIDs(0, ptr::null_mut(), &mut count) };
    if code == CL_PLATFORM_NOT_FOUND_KHR || (code == CL_SUCCESS && count == 0) {
        return Err(DeviceError::NoPlatform);
    }
    if code != CL_SUCCESS {
        return Err(DeviceError::Init { call: "clGetPlatformIDs", code });
    }

    let mut ids = vec![ptr::null_mut(); count as usize];
    cl_check!(clGetPlatformIDs(count, ids.as_mut_ptr(), ptr::null_mut())).map_err(DeviceError::into_setup)?;
    Ok(ids)
}

fn first_device(platform: cl_platform_id, device_type: cl_device_type) -> Option<cl_device_id> {
    let mut device = ptr::null_mut();
    let mut count: cl_uint = 0;
    let code = unsafe { clGetDeviceIDs(platform, device_type, 1, &mut device, &mut count) };
    if code != CL_SUCCESS || count == 0 {
        debug!("На платформе нет устройств нужного типа (код {})", code);
        return None;
    }
    Some(device)
}

fn device_name(device: cl_device_id) -> String {
    let mut size = 0usize;
    if unsafe { clGetDeviceInfo(device, CL_DEVICE_NAME, 0, ptr::null_mut(), &mut size) } != CL_SUCCESS {
        return String::from("<unknown>");
    }
    let mut name = vec![0u8; size];
    let code = unsafe {
        clGetDeviceInfo(
            device,
            CL_DEVICE_NAME,
            size,
            name.as_mut_ptr() as *mut std::ffi::c_void,
            ptr::null_mut(),
        )
    };
    if code != CL_SUCCESS {
        return String::from("<unknown>");
    }
    String::from_utf8_lossy(&name).trim_end_matches('\0').to_string()
}

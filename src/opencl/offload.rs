//! Умножение блока строк на устройстве OpenCL

use super::bindings::*;
use super::device::DeviceHandle;
use super::types::*;
use crate::error::{DeviceError, MatmulError, Result};
use crate::matrix::{KernelSource, Matrix, RowBlock, KERNEL_ENTRY};
use crate::{cl_check, cl_create};
use log::{debug, error};
use std::ffi::{c_void, CString};
use std::ptr;

/// Буфер в памяти устройства, освобождается при выходе из области видимости
struct Buffer(cl_mem);

impl Buffer {
    fn input(handle: &DeviceHandle, data: &[i32]) -> Result<Self, DeviceError> {
        let mem = cl_create!(clCreateBuffer(
            handle.context,
            CL_MEM_READ_ONLY | CL_MEM_COPY_HOST_PTR,
            std::mem::size_of_val(data),
            data.as_ptr() as *mut c_void
        ))?;
        Ok(Self(mem))
    }

    fn output(handle: &DeviceHandle, len: usize) -> Result<Self, DeviceError> {
        let mem = cl_create!(clCreateBuffer(
            handle.context,
            CL_MEM_WRITE_ONLY,
            len * std::mem::size_of::<i32>(),
            ptr::null_mut()
        ))?;
        Ok(Self(mem))
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            clReleaseMemObject(self.0);
        }
    }
}

/// Скомпилированное ядро `matrixMultiplication` на конкретном устройстве
pub struct OffloadStrategy {
    program: cl_program,
    kernel: cl_kernel,
    handle: DeviceHandle,
}

unsafe impl Send for OffloadStrategy {}

impl OffloadStrategy {
    /// Компилирует ядро; ошибка сборки возвращается как `KernelBuild` с логом
    pub fn new(handle: DeviceHandle, source: &KernelSource) -> Result<Self, DeviceError> {
        let code = source.load()?;
        let source_ptr = code.as_ptr() as *const std::ffi::c_char;
        let source_len = code.len();

        let program = cl_create!(clCreateProgramWithSource(
            handle.context,
            1,
            &source_ptr,
            &source_len
        ))
        .map_err(DeviceError::into_setup)?;

        let build_status = unsafe {
            clBuildProgram(program, 1, &handle.device, ptr::null(), None, ptr::null_mut())
        };
        if build_status != CL_SUCCESS {
            let log = build_log(program, &handle);
            error!("Ошибка при компиляции программы ({}):\n{}", build_status, log);
            unsafe { clReleaseProgram(program) };
            if build_status == CL_BUILD_PROGRAM_FAILURE {
                return Err(DeviceError::KernelBuild { log });
            }
            return Err(DeviceError::Init { call: "clBuildProgram", code: build_status });
        }

        let entry = CString::new(KERNEL_ENTRY).map_err(|_| DeviceError::KernelBuild {
            log: format!("недопустимое имя ядра {KERNEL_ENTRY:?}"),
        })?;
        let kernel = match cl_create!(clCreateKernel(program, entry.as_ptr())) {
            Ok(kernel) => kernel,
            Err(e) => {
                unsafe { clReleaseProgram(program) };
                return Err(e.into_setup());
            }
        };

        debug!("Ядро {} собрано для {}", KERNEL_ENTRY, handle.name());
        Ok(Self { program, kernel, handle })
    }

    pub fn device_name(&self) -> &str {
        self.handle.name()
    }

    /// Копирует блок строк `a` и всю `b` на устройство, запускает ядро
    /// над (строки блока × N) и читает строки результата обратно.
    pub fn multiply(&self, a: &RowBlock, b: &Matrix) -> Result<RowBlock> {
        let size = b.size();
        if a.width() != size {
            return Err(MatmulError::DimensionMismatch { expected: size, actual: a.width() });
        }
        let range = a.range();
        if range.is_empty() {
            return Ok(RowBlock::empty(range.start, size));
        }

        let n = to_cl_int(size)?;
        let row_start = to_cl_int(range.start)?;
        let row_end = to_cl_int(range.end)?;
        let output_len = range.len() * size;

        let a_buffer = Buffer::input(&self.handle, a.as_slice())?;
        let b_buffer = Buffer::input(&self.handle, b.as_slice())?;
        let c_buffer = Buffer::output(&self.handle, output_len)?;

        self.set_arg(0, &a_buffer.0)?;
        self.set_arg(1, &b_buffer.0)?;
        self.set_arg(2, &c_buffer.0)?;
        self.set_arg(3, &n)?;
        self.set_arg(4, &row_start)?;
        self.set_arg(5, &row_end)?;

        let global_size = [range.len(), size];
        cl_check!(clEnqueueNDRangeKernel(
            self.handle.queue,
            self.kernel,
            2,
            ptr::null(),
            global_size.as_ptr(),
            ptr::null(),
            0,
            ptr::null(),
            ptr::null_mut()
        ))?;
        self.handle.finish()?;

        let mut c = vec![0i32; output_len];
        cl_check!(clEnqueueReadBuffer(
            self.handle.queue,
            c_buffer.0,
            CL_TRUE,
            0,
            output_len * std::mem::size_of::<i32>(),
            c.as_mut_ptr() as *mut c_void,
            0,
            ptr::null(),
            ptr::null_mut()
        ))?;

        RowBlock::new(range.start, size, c)
    }

    fn set_arg<T>(&self, index: cl_uint, value: &T) -> Result<(), DeviceError> {
        cl_check!(clSetKernelArg(
            self.kernel,
            index,
            std::mem::size_of::<T>(),
            value as *const T as *const c_void
        ))
    }
}

impl Drop for OffloadStrategy {
    fn drop(&mut self) {
        unsafe {
            clReleaseKernel(self.kernel);
            clReleaseProgram(self.program);
        }
    }
}

fn to_cl_int(value: usize) -> Result<cl_int> {
    cl_int::try_from(value).map_err(|_| MatmulError::DimensionMismatch {
        expected: cl_int::MAX as usize,
        actual: value,
    })
}

fn build_log(program: cl_program, handle: &DeviceHandle) -> String {
    let mut log_size = 0usize;
    let code = unsafe {
        clGetProgramBuildInfo(program, handle.device, CL_PROGRAM_BUILD_LOG, 0, ptr::null_mut(), &mut log_size)
    };
    if code != CL_SUCCESS {
        return String::new();
    }

    let mut log = vec![0u8; log_size];
    let code = unsafe {
        clGetProgramBuildInfo(
            program,
            handle.device,
            CL_PROGRAM_BUILD_LOG,
            log_size,
            log.as_mut_ptr() as *mut c_void,
            ptr::null_mut(),
        )
    };
    if code != CL_SUCCESS {
        return String::new();
    }
    String::from_utf8_lossy(&log).trim_end_matches('\0').to_string()
}
